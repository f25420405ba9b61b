//! Argument Validation Module
//!
//! Checks caller-supplied arguments against an operation's schema and turns
//! them into a strongly typed [`BwaInvocation`] before anything is executed.
//!
//! Parameters are checked in declaration order and validation stops at the
//! first failure. The only side effects are read-only `stat` calls; files are
//! never opened.

use super::catalog::{ArgValue, OperationId, OperationSpec, ParamKind, ParameterSpec, PathRole};
use super::result::FailureKind;
use crate::config::Config;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Error types for argument validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required parameter '{name}'")]
    MissingParameter { name: String },

    #[error("Invalid choice '{value}' for '{name}'; allowed values: {}", .allowed.join(", "))]
    InvalidChoice {
        name: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("File not found for '{name}': {}", .path.display())]
    FileNotFound { name: String, path: PathBuf },

    #[error("File for '{name}' is too large: {actual} bytes exceeds limit of {limit} bytes ({})", .path.display())]
    FileTooLarge {
        name: String,
        path: PathBuf,
        actual: u64,
        limit: u64,
    },
}

impl ValidationError {
    /// Failure kind reported to the caller
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MissingParameter { .. } => FailureKind::MissingParameter,
            Self::InvalidChoice { .. } => FailureKind::InvalidChoice,
            Self::InvalidValue { .. } => FailureKind::InvalidValue,
            Self::FileNotFound { .. } => FailureKind::FileNotFound,
            Self::FileTooLarge { .. } => FailureKind::FileTooLarge,
        }
    }

    /// Name of the offending parameter
    pub fn parameter(&self) -> &str {
        match self {
            Self::MissingParameter { name }
            | Self::InvalidChoice { name, .. }
            | Self::InvalidValue { name, .. }
            | Self::FileNotFound { name, .. }
            | Self::FileTooLarge { name, .. } => name,
        }
    }

    fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Algorithm for `bwa index -a`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAlgorithm {
    Bwtsw,
    Is,
}

impl IndexAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bwtsw => "bwtsw",
            Self::Is => "is",
        }
    }
}

impl std::str::FromStr for IndexAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bwtsw" => Ok(Self::Bwtsw),
            "is" => Ok(Self::Is),
            other => Err(format!("unknown index algorithm '{other}'")),
        }
    }
}

/// Fully validated, typed arguments for one `bwa` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BwaInvocation {
    Index {
        reference_fasta: PathBuf,
        algorithm: IndexAlgorithm,
    },
    Mem {
        reference: PathBuf,
        reads1: PathBuf,
        reads2: Option<PathBuf>,
        threads: u32,
        min_seed_length: u32,
        band_width: u32,
        read_group: Option<String>,
    },
    Aln {
        reference: PathBuf,
        reads: PathBuf,
        threads: u32,
        max_mismatches: u32,
        max_gap_opens: u32,
    },
    Samse {
        reference: PathBuf,
        sai_file: PathBuf,
        reads: PathBuf,
    },
    Sampe {
        reference: PathBuf,
        sai_file1: PathBuf,
        sai_file2: PathBuf,
        reads1: PathBuf,
        reads2: PathBuf,
    },
}

/// Output of a successful validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedArguments {
    /// Operation the arguments were validated against
    pub operation: OperationId,

    /// Every present parameter after defaults, in normalized form
    pub normalized: BTreeMap<&'static str, ArgValue>,

    /// Typed record consumed by the command builder
    pub invocation: BwaInvocation,
}

/// Validate `raw` against `spec`
///
/// # Errors
///
/// Returns the first [`ValidationError`] encountered, in parameter
/// declaration order. Parameters not declared by the operation are reported
/// after every declared parameter has passed.
pub fn validate(
    spec: &OperationSpec,
    raw: &Map<String, Value>,
    config: &Config,
) -> Result<ValidatedArguments, ValidationError> {
    let mut normalized = BTreeMap::new();

    for param in &spec.parameters {
        let supplied = raw.get(param.name).filter(|v| !v.is_null());
        let value = match (supplied, &param.default) {
            (Some(value), _) => check_value(param, value, config)?,
            (None, _) if param.required => {
                return Err(ValidationError::MissingParameter {
                    name: param.name.to_string(),
                })
            }
            (None, Some(default)) => default.clone(),
            (None, None) => continue,
        };
        normalized.insert(param.name, value);
    }

    if let Some(unexpected) = raw.keys().find(|key| spec.parameter(key).is_none()) {
        let accepted: Vec<&str> = spec.parameters.iter().map(|p| p.name).collect();
        return Err(ValidationError::invalid(
            unexpected,
            format!(
                "unexpected parameter for {}; accepted parameters: {}",
                spec.name(),
                accepted.join(", ")
            ),
        ));
    }

    let invocation = typed_invocation(spec.id, &normalized)?;
    tracing::debug!(operation = %spec.id, ?normalized, "Arguments validated");

    Ok(ValidatedArguments {
        operation: spec.id,
        normalized,
        invocation,
    })
}

/// Check one supplied value against its parameter spec
fn check_value(param: &ParameterSpec, value: &Value, config: &Config) -> Result<ArgValue, ValidationError> {
    match &param.kind {
        ParamKind::Path(role) => {
            let raw = value
                .as_str()
                .ok_or_else(|| ValidationError::invalid(param.name, "expected a path string"))?;
            if raw.is_empty() {
                return Err(ValidationError::invalid(param.name, "path must not be empty"));
            }
            check_path(param.name, *role, Path::new(raw), config.max_file_size).map(ArgValue::Path)
        }
        ParamKind::Enum { choices } => {
            let raw = value
                .as_str()
                .ok_or_else(|| ValidationError::invalid(param.name, "expected a string"))?;
            if choices.contains(&raw) {
                Ok(ArgValue::Choice(raw.to_string()))
            } else {
                Err(ValidationError::InvalidChoice {
                    name: param.name.to_string(),
                    value: raw.to_string(),
                    allowed: choices.iter().map(|c| c.to_string()).collect(),
                })
            }
        }
        ParamKind::Integer { min, max } => {
            let n = parse_integer(param.name, value)?;
            if n < *min || n > *max {
                return Err(ValidationError::invalid(
                    param.name,
                    format!("{n} is out of range [{min}, {max}]"),
                ));
            }
            Ok(ArgValue::Integer(n))
        }
        ParamKind::String => {
            let raw = value
                .as_str()
                .ok_or_else(|| ValidationError::invalid(param.name, "expected a string"))?;
            if param.name == "read_group" {
                check_read_group(raw)?;
            }
            Ok(ArgValue::Text(raw.to_string()))
        }
    }
}

/// Accept JSON integers, integral floats, and decimal strings
fn parse_integer(name: &str, value: &Value) -> Result<i64, ValidationError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                    _ => Err(ValidationError::invalid(name, format!("{n} is not an integer"))),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::invalid(name, format!("'{s}' is not an integer"))),
        other => Err(ValidationError::invalid(
            name,
            format!("expected an integer, got {}", json_type_name(other)),
        )),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `bwa mem -R` rejects lines that are not `@RG` headers with an ID
fn check_read_group(raw: &str) -> Result<(), ValidationError> {
    if !raw.starts_with("@RG") {
        return Err(ValidationError::invalid("read_group", "must start with '@RG'"));
    }
    if !raw.contains("ID:") {
        return Err(ValidationError::invalid("read_group", "must contain an 'ID:' field"));
    }
    Ok(())
}

/// Check that a path exists, is a readable regular file, and respects the size limit
///
/// Index prefixes are also accepted when only `<prefix>.bwt` exists. The
/// returned path is absolute: the aligner runs inside the scratch directory,
/// so a relative path would name a different file there.
fn check_path(name: &str, role: PathRole, path: &Path, max_file_size: u64) -> Result<PathBuf, ValidationError> {
    let path = std::path::absolute(path)
        .map_err(|e| ValidationError::invalid(name, format!("cannot resolve {}: {e}", path.display())))?;
    let path = path.as_path();

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) if role == PathRole::IndexPrefix && index_file(path).is_file() => {
            return Ok(path.to_path_buf());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ValidationError::FileNotFound {
                name: name.to_string(),
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(ValidationError::invalid(
                name,
                format!("cannot access {}: {e}", path.display()),
            ));
        }
    };

    if !metadata.is_file() {
        return Err(ValidationError::invalid(
            name,
            format!("{} is not a regular file", path.display()),
        ));
    }
    if !is_readable(path) {
        return Err(ValidationError::invalid(
            name,
            format!("{} is not readable", path.display()),
        ));
    }
    if metadata.len() > max_file_size {
        return Err(ValidationError::FileTooLarge {
            name: name.to_string(),
            path: path.to_path_buf(),
            actual: metadata.len(),
            limit: max_file_size,
        });
    }
    Ok(path.to_path_buf())
}

/// `<prefix>.bwt`, the file every BWA index contains
pub fn index_file(prefix: &Path) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(".bwt");
    PathBuf::from(name)
}

/// Readable by this process, judged with its real uid and gid
#[cfg(unix)]
fn is_readable(path: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;
    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: access only reads the NUL-terminated string it is given.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK) == 0 }
}

#[cfg(not(unix))]
fn is_readable(_path: &Path) -> bool {
    true
}

/// Lift the normalized map into a typed record
fn typed_invocation(
    operation: OperationId,
    values: &BTreeMap<&'static str, ArgValue>,
) -> Result<BwaInvocation, ValidationError> {
    let args = Fields(values);
    let invocation = match operation {
        OperationId::Index => BwaInvocation::Index {
            reference_fasta: args.path("reference_fasta")?,
            algorithm: args
                .choice("algorithm")?
                .parse()
                .map_err(|e: String| ValidationError::invalid("algorithm", e))?,
        },
        OperationId::Mem => BwaInvocation::Mem {
            reference: args.path("reference")?,
            reads1: args.path("reads1")?,
            reads2: args.optional_path("reads2"),
            threads: args.count("threads")?,
            min_seed_length: args.count("min_seed_length")?,
            band_width: args.count("band_width")?,
            read_group: args.optional_text("read_group"),
        },
        OperationId::Aln => BwaInvocation::Aln {
            reference: args.path("reference")?,
            reads: args.path("reads")?,
            threads: args.count("threads")?,
            max_mismatches: args.count("max_mismatches")?,
            max_gap_opens: args.count("max_gap_opens")?,
        },
        OperationId::Samse => BwaInvocation::Samse {
            reference: args.path("reference")?,
            sai_file: args.path("sai_file")?,
            reads: args.path("reads")?,
        },
        OperationId::Sampe => BwaInvocation::Sampe {
            reference: args.path("reference")?,
            sai_file1: args.path("sai_file1")?,
            sai_file2: args.path("sai_file2")?,
            reads1: args.path("reads1")?,
            reads2: args.path("reads2")?,
        },
    };
    Ok(invocation)
}

/// Typed view over the normalized argument map
struct Fields<'a>(&'a BTreeMap<&'static str, ArgValue>);

impl Fields<'_> {
    fn missing(name: &str) -> ValidationError {
        ValidationError::MissingParameter {
            name: name.to_string(),
        }
    }

    fn path(&self, name: &str) -> Result<PathBuf, ValidationError> {
        self.optional_path(name).ok_or_else(|| Self::missing(name))
    }

    fn optional_path(&self, name: &str) -> Option<PathBuf> {
        match self.0.get(name) {
            Some(ArgValue::Path(p)) => Some(p.clone()),
            _ => None,
        }
    }

    fn choice(&self, name: &str) -> Result<&str, ValidationError> {
        match self.0.get(name) {
            Some(ArgValue::Choice(s)) => Ok(s),
            _ => Err(Self::missing(name)),
        }
    }

    fn count(&self, name: &str) -> Result<u32, ValidationError> {
        match self.0.get(name) {
            Some(ArgValue::Integer(n)) => u32::try_from(*n)
                .map_err(|_| ValidationError::invalid(name, format!("{n} is out of range"))),
            _ => Err(Self::missing(name)),
        }
    }

    fn optional_text(&self, name: &str) -> Option<String> {
        match self.0.get(name) {
            Some(ArgValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }
}
