// src/configfile.rs
// INI-style option file holding the queue tuning knobs.

use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io(String),
    Syntax(usize, String), // line number, message
    SectionNotFound(String),
    OptionNotFound(String, String),
    ParseError(String, String, String), // option, value, type_expected
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Unable to read config: {}", msg),
            ConfigError::Syntax(line, msg) => write!(f, "Config line {}: {}", line, msg),
            ConfigError::SectionNotFound(s) => write!(f, "Section not found: [{}]", s),
            ConfigError::OptionNotFound(s, o) => write!(f, "Option '{}' not found in section '[{}]'", o, s),
            ConfigError::ParseError(o, v, t) => write!(f, "Failed to parse option '{}' value '{}' as {}", o, v, t),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Default, Clone)]
pub struct Configfile {
    // section -> { option -> raw value }, names lowercased
    data: HashMap<String, HashMap<String, String>>,
}

impl Configfile {
    pub fn new() -> Self {
        Configfile { data: HashMap::new() }
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let mut config = Configfile::new();
        config.parse(&content)?;
        log::debug!("Loaded config from {} ({} sections)", path.display(), config.data.len());
        Ok(config)
    }

    /// Parses `[section]` headers and `key = value` or `key: value` lines.
    /// Text after `#` or `;` is a comment.
    pub fn parse(&mut self, config_content: &str) -> Result<(), ConfigError> {
        self.data.clear();
        let mut current_section: Option<String> = None;

        for (idx, line_raw) in config_content.lines().enumerate() {
            let lineno = idx + 1;
            let line = match line_raw.find(|c| c == '#' || c == ';') {
                Some(index) => &line_raw[..index],
                None => line_raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = line[1..line.len() - 1].trim().to_lowercase();
                if name.is_empty() {
                    return Err(ConfigError::Syntax(lineno, "empty section name".to_string()));
                }
                self.data.entry(name.clone()).or_default();
                current_section = Some(name);
                continue;
            }

            let section = current_section
                .as_ref()
                .ok_or_else(|| ConfigError::Syntax(lineno, format!("line outside of section: {}", line_raw)))?;
            let (key, value) = line
                .split_once('=')
                .or_else(|| line.split_once(':'))
                .ok_or_else(|| ConfigError::Syntax(lineno, format!("malformed line in [{}]: {}", section, line_raw)))?;
            let key = key.trim().to_lowercase();
            if key.is_empty() {
                return Err(ConfigError::Syntax(lineno, format!("empty key in [{}]", section)));
            }
            self.data
                .entry(section.clone())
                .or_default()
                .insert(key, value.trim().to_string());
        }
        Ok(())
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.data.contains_key(&section.to_lowercase())
    }

    pub fn get_str(&self, section: &str, option: &str) -> Result<&String, ConfigError> {
        self.data
            .get(&section.to_lowercase())
            .ok_or_else(|| ConfigError::SectionNotFound(section.to_string()))?
            .get(&option.to_lowercase())
            .ok_or_else(|| ConfigError::OptionNotFound(section.to_string(), option.to_string()))
    }

    pub fn get(&self, section: &str, option: &str, default: Option<&str>) -> Result<String, ConfigError> {
        match self.get_str(section, option) {
            Ok(s) => Ok(s.clone()),
            Err(ConfigError::OptionNotFound(..)) => default
                .map(str::to_string)
                .ok_or_else(|| ConfigError::OptionNotFound(section.to_string(), option.to_string())),
            Err(e) => Err(e),
        }
    }

    // getfloat with optional default, min, max checks
    pub fn getfloat(
        &self,
        section: &str,
        option: &str,
        default: Option<f64>,
        minval: Option<f64>,
        maxval: Option<f64>,
    ) -> Result<f64, ConfigError> {
        let parsed = match self.get_str(section, option) {
            Ok(s) => s
                .parse::<f64>()
                .map_err(|_| ConfigError::ParseError(option.to_string(), s.clone(), "float".to_string()))?,
            Err(ConfigError::OptionNotFound(..)) => {
                return default.ok_or_else(|| ConfigError::OptionNotFound(section.to_string(), option.to_string()));
            }
            Err(e) => return Err(e),
        };
        if let Some(min) = minval {
            if parsed < min {
                return Err(ConfigError::ValidationError(format!(
                    "Option '{}' in section '[{}]' ({}) must be >= {}",
                    option, section, parsed, min
                )));
            }
        }
        if let Some(max) = maxval {
            if parsed > max {
                return Err(ConfigError::ValidationError(format!(
                    "Option '{}' in section '[{}]' ({}) must be <= {}",
                    option, section, parsed, max
                )));
            }
        }
        Ok(parsed)
    }

    pub fn getboolean(&self, section: &str, option: &str, default: Option<bool>) -> Result<bool, ConfigError> {
        match self.get_str(section, option) {
            Ok(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(ConfigError::ParseError(option.to_string(), s.clone(), "boolean".to_string())),
            },
            Err(ConfigError::OptionNotFound(..)) => {
                default.ok_or_else(|| ConfigError::OptionNotFound(section.to_string(), option.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "
# queue tuning
[trapq]
max_null_move = 0.5   ; seconds
history_retention: 12
fill_gaps = no

[Other]
key = value
";

    #[test]
    fn parse_sections_and_options() {
        let mut config = Configfile::new();
        config.parse(SAMPLE).unwrap();
        assert!(config.has_section("trapq"));
        assert!(config.has_section("other"));
        assert_eq!(config.get_str("TRAPQ", "Max_Null_Move").unwrap(), "0.5");
        assert_eq!(config.get_str("trapq", "history_retention").unwrap(), "12");
        assert_eq!(config.get("other", "key", None).unwrap(), "value");
    }

    #[test]
    fn typed_getters_apply_defaults_and_limits() {
        let mut config = Configfile::new();
        config.parse(SAMPLE).unwrap();
        assert_eq!(config.getfloat("trapq", "max_null_move", None, Some(0.0), None).unwrap(), 0.5);
        assert_eq!(config.getfloat("trapq", "missing", Some(3.0), None, None).unwrap(), 3.0);
        assert!(!config.getboolean("trapq", "fill_gaps", Some(true)).unwrap());
        assert!(config.getboolean("trapq", "missing", Some(true)).unwrap());

        let err = config.getfloat("trapq", "history_retention", None, None, Some(10.0)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        let err = config.getfloat("other", "key", None, None, None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
        let err = config.getfloat("nope", "key", Some(1.0), None, None).unwrap_err();
        assert_eq!(err, ConfigError::SectionNotFound("nope".to_string()));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let mut config = Configfile::new();
        assert!(matches!(config.parse("key = 1"), Err(ConfigError::Syntax(1, _))));
        assert!(matches!(config.parse("[a]\njunk"), Err(ConfigError::Syntax(2, _))));
        assert!(matches!(config.parse("[ ]"), Err(ConfigError::Syntax(1, _))));
    }
}
