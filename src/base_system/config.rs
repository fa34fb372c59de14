//! 配置文件读写：带注释的 YAML，缺失字段用默认值补齐并回写。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

/// A config type persisted as `FILE_NAME`, written field by field with comments.
pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;
    fn fields() -> &'static [FieldMeta];
}

pub fn config_path<T: ConfigSpec>(base_dir: Option<&Path>) -> PathBuf {
    match base_dir {
        Some(base) => base.join(T::FILE_NAME),
        None => PathBuf::from(T::FILE_NAME),
    }
}

/// Loads `<base_dir>/FILE_NAME`, creating it from defaults when absent.
///
/// User values are layered over the defaults; when the file lacks any known
/// field it is rewritten so new options show up with their comments.
pub fn load_or_create_with_base<T: ConfigSpec>(base_dir: Option<&Path>) -> Result<T, ConfigError> {
    let path = config_path::<T>(base_dir);

    if !path.exists() {
        let config = T::default();
        save(&config, &path)?;
        return Ok(config);
    }

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let user: Value = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;

    let missing = missing_fields::<T>(&user);
    let mut merged = to_value(&T::default())?;
    overlay(&mut merged, user);
    let config: T =
        serde_yaml::from_value(merged).map_err(|err| ConfigError::Validation(err.to_string()))?;

    if !missing.is_empty() {
        save(&config, &path)?;
    }
    Ok(config)
}

pub fn save<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let yaml = render_with_comments(config)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn render_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(mapping) = to_value(config)? else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut out = String::new();
    for field in T::fields() {
        if !field.description.is_empty() {
            for line in field.description.lines() {
                out.push_str("# ");
                out.push_str(line);
                out.push('\n');
            }
        }
        let key = Value::String(field.name.to_string());
        let value = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let entry = serde_yaml::to_string(&Mapping::from_iter([(key, value)]))
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        out.push_str(entry.trim_end());
        out.push('\n');
    }
    Ok(out)
}

fn to_value<T: Serialize>(config: &T) -> Result<Value, ConfigError> {
    serde_yaml::to_value(config).map_err(|err| ConfigError::Validation(err.to_string()))
}

fn missing_fields<T: ConfigSpec>(user: &Value) -> Vec<&'static str> {
    let Value::Mapping(map) = user else {
        return T::fields().iter().map(|f| f.name).collect();
    };
    T::fields()
        .iter()
        .filter(|f| !map.contains_key(Value::String(f.name.to_string())))
        .map(|f| f.name)
        .collect()
}

// Mappings merge key by key; any other user value replaces the default outright.
fn overlay(base: &mut Value, user: Value) {
    match (base, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, value) in src {
                match dest.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        dest.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (dest, other) => *dest = other,
    }
}
