//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::mime::MimeTable;
use crate::config::schema::{RouteConfig, ServerConfig};
use crate::config::validation::prune_dangling_relays;

/// Route configuration file looked up inside the served directory.
pub const SERVER_FILE: &str = "server.json";

/// Commented starting point written by [`write_template`].
pub const SERVER_TEMPLATE: &str = r#"{

	// use this section to configure redirection within the static server
	// for example, if your site is hosted in a subfolder and you want your user to
	// access it without typing the subfolder: localhost:8080/ => localhost:8080/subfolder/
	"redirect": {
		//"^/$": "/subfolder/"
	},

	// mapping applies only if the static server can't find a particular resource
	// you shouldn't switch folders here, because that would mess with the referer
	"mapping": {
		// "^(/?.*)/$": "$1/index.html" // default mapping always enabled
		//"^/somefolder$": "/somefolder/index.html",
		//"^/js/(.*).js$": "/js/${1}.min.js",
		//"^/css/(.*).css$": "/css/${1}.min.css"
	},

	// requests whose path starts with one of these keys are relayed to the named host
	"relay": {
		//"/mybackend1": "myBackend",
		//"/mybackend2": "myBackend"
	},

	// backend data for the relay section
	"hosts": {
		//"myBackend": {
		//	"protocol": "https",
		//	"host": "my.backend.com",
		//	"port": 443
		//}
	}
}
"#;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing served directory {0}")]
    MissingDirectory(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the server configuration for `served_dir`.
///
/// `server.json` inside the directory is optional; when absent every route
/// table is empty. `mime_types` points at an extension → content-type JSON
/// object; when `None` the built-in table is used.
pub fn load_server_config(
    served_dir: &Path,
    mime_types: Option<&Path>,
) -> Result<ServerConfig, ConfigError> {
    if !served_dir.is_dir() {
        return Err(ConfigError::MissingDirectory(served_dir.to_path_buf()));
    }
    let served_dir = served_dir.canonicalize().map_err(|source| ConfigError::Io {
        path: served_dir.to_path_buf(),
        source,
    })?;

    let mut config = ServerConfig::new(&served_dir);

    let server_file = served_dir.join(SERVER_FILE);
    if server_file.is_file() {
        tracing::debug!(path = %server_file.display(), "Loading custom server configuration");
        config.routes = load_route_config(&server_file)?;
    }
    prune_dangling_relays(&mut config.routes);

    if let Some(path) = mime_types {
        config.mime_types = load_mime_types(path)?;
    }

    Ok(config)
}

/// Parse a `server.json` file. `//` and `/* */` comments are allowed.
pub fn load_route_config(path: &Path) -> Result<RouteConfig, ConfigError> {
    let content = read(path)?;
    serde_json::from_str(&strip_json_comments(&content)).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse an extension → content-type JSON object of overrides.
pub fn load_mime_types(path: &Path) -> Result<MimeTable, ConfigError> {
    let content = read(path)?;
    let entries: std::collections::HashMap<String, String> =
        serde_json::from_str(&strip_json_comments(&content)).map_err(|source| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
    Ok(MimeTable::from_entries(entries))
}

/// Write [`SERVER_TEMPLATE`] as `server.json` into `folder`.
///
/// Refuses to overwrite an existing file.
pub fn write_template(folder: &Path) -> Result<PathBuf, ConfigError> {
    if !folder.is_dir() {
        return Err(ConfigError::MissingDirectory(folder.to_path_buf()));
    }
    let file = folder.join(SERVER_FILE);
    if file.exists() {
        return Err(ConfigError::AlreadyExists(file));
    }
    fs::write(&file, SERVER_TEMPLATE).map_err(|source| ConfigError::Io {
        path: file.clone(),
        source,
    })?;
    Ok(file)
}

/// Remove `//` line comments and `/* */` block comments outside string literals.
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for skipped in chars.by_ref() {
                    if previous == '*' && skipped == '/' {
                        break;
                    }
                    if skipped == '\n' {
                        out.push('\n');
                    }
                    previous = skipped;
                }
            }
            _ => out.push(c),
        }
    }

    out
}
