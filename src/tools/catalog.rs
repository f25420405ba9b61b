//! Operation Catalog
//!
//! Declarative description of every BWA operation the server exposes: its
//! name, the `bwa` subcommand it maps to, and an ordered list of parameters
//! with their kinds, defaults and constraints.
//!
//! The catalog is built once and never mutated. Lookup by name is its only
//! operation; a miss is reported by the dispatcher as `UnknownOperation`.

use lazy_static::lazy_static;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

/// Identifier for each supported operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationId {
    Index,
    Mem,
    Aln,
    Samse,
    Sampe,
}

impl OperationId {
    /// Tool name as exposed to callers
    pub fn name(&self) -> &'static str {
        match self {
            Self::Index => "bwa_index",
            Self::Mem => "bwa_mem",
            Self::Aln => "bwa_aln",
            Self::Samse => "bwa_samse",
            Self::Sampe => "bwa_sampe",
        }
    }

    /// `bwa` subcommand
    pub fn subcommand(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Mem => "mem",
            Self::Aln => "aln",
            Self::Samse => "samse",
            Self::Sampe => "sampe",
        }
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a path parameter points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRole {
    /// A data file that must exist and respect the size ceiling
    InputFile,
    /// A BWA index prefix: the FASTA itself or `<prefix>.bwt` must exist
    IndexPrefix,
}

/// Kind and constraint of a parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Path(PathRole),
    Enum { choices: &'static [&'static str] },
    Integer { min: i64, max: i64 },
    String,
}

impl ParamKind {
    fn json_type(&self) -> &'static str {
        match self {
            Self::Integer { .. } => "integer",
            _ => "string",
        }
    }
}

/// A normalized argument value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Path(PathBuf),
    Choice(String),
    Integer(i64),
    Text(String),
}

impl ArgValue {
    fn to_json(&self) -> Value {
        match self {
            Self::Path(p) => json!(p.display().to_string()),
            Self::Choice(s) | Self::Text(s) => json!(s),
            Self::Integer(n) => json!(n),
        }
    }
}

/// Declarative description of one operation argument
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<ArgValue>,
}

impl ParameterSpec {
    /// Required input data file
    fn input_file(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::Path(PathRole::InputFile),
            required: true,
            default: None,
        }
    }

    /// Required index prefix (indexed reference genome)
    fn index_prefix(name: &'static str) -> Self {
        Self {
            name,
            description: "Path to indexed reference genome",
            kind: ParamKind::Path(PathRole::IndexPrefix),
            required: true,
            default: None,
        }
    }

    fn integer(name: &'static str, description: &'static str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::Integer { min, max },
            required: false,
            default: Some(ArgValue::Integer(default)),
        }
    }

    fn choice(
        name: &'static str,
        description: &'static str,
        choices: &'static [&'static str],
        default: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::Enum { choices },
            required: false,
            default: Some(ArgValue::Choice(default.to_string())),
        }
    }

    fn text(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::String,
            required: false,
            default: None,
        }
    }

    /// Make a parameter optional with no default
    fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// JSON Schema fragment for this parameter
    pub fn json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), json!(self.kind.json_type()));
        schema.insert("description".into(), json!(self.description));
        match &self.kind {
            ParamKind::Enum { choices } => {
                schema.insert("enum".into(), json!(choices));
            }
            ParamKind::Integer { min, max } => {
                schema.insert("minimum".into(), json!(min));
                schema.insert("maximum".into(), json!(max));
            }
            ParamKind::Path(_) | ParamKind::String => {}
        }
        if let Some(ref default) = self.default {
            schema.insert("default".into(), default.to_json());
        }
        Value::Object(schema)
    }
}

/// Declarative description of one operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    pub id: OperationId,
    pub description: &'static str,
    pub parameters: Vec<ParameterSpec>,
}

impl OperationSpec {
    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// JSON Schema for the operation's argument object
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.to_string(), p.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }
}

/// Index construction algorithms accepted by `bwa index -a`
pub const INDEX_ALGORITHMS: &[&str] = &["bwtsw", "is"];

lazy_static! {
    static ref CATALOG: Vec<OperationSpec> = vec![
        OperationSpec {
            id: OperationId::Index,
            description: "Create BWA index for reference genome",
            parameters: vec![
                ParameterSpec::input_file("reference_fasta", "Path to reference FASTA file"),
                ParameterSpec::choice(
                    "algorithm",
                    "Indexing algorithm (bwtsw for genomes over 2GB, is for small genomes)",
                    INDEX_ALGORITHMS,
                    "bwtsw",
                ),
            ],
        },
        OperationSpec {
            id: OperationId::Mem,
            description: "Align reads using BWA-MEM algorithm",
            parameters: vec![
                ParameterSpec::index_prefix("reference"),
                ParameterSpec::input_file("reads1", "Path to first reads file (FASTQ)"),
                ParameterSpec::input_file("reads2", "Path to second reads file for paired-end")
                    .optional(),
                ParameterSpec::integer("threads", "Number of threads", 1, 256, 4),
                ParameterSpec::integer("min_seed_length", "Minimum seed length", 1, 1000, 19),
                ParameterSpec::integer(
                    "band_width",
                    "Band width for banded alignment",
                    1,
                    100_000,
                    100,
                ),
                ParameterSpec::text(
                    "read_group",
                    "Read group header line (e.g., '@RG\\tID:sample1\\tSM:sample1')",
                ),
            ],
        },
        OperationSpec {
            id: OperationId::Aln,
            description: "Find SA coordinates with BWA-backtrack algorithm",
            parameters: vec![
                ParameterSpec::index_prefix("reference"),
                ParameterSpec::input_file("reads", "Path to reads file (FASTQ)"),
                ParameterSpec::integer("threads", "Number of threads", 1, 256, 4),
                ParameterSpec::integer("max_mismatches", "Maximum number of mismatches", 0, 100, 4),
                ParameterSpec::integer("max_gap_opens", "Maximum number of gap opens", 0, 100, 1),
            ],
        },
        OperationSpec {
            id: OperationId::Samse,
            description: "Generate alignments in SAM format (single-end)",
            parameters: vec![
                ParameterSpec::index_prefix("reference"),
                ParameterSpec::input_file("sai_file", "Path to .sai file from bwa aln"),
                ParameterSpec::input_file("reads", "Path to original reads file"),
            ],
        },
        OperationSpec {
            id: OperationId::Sampe,
            description: "Generate alignments in SAM format (paired-end)",
            parameters: vec![
                ParameterSpec::index_prefix("reference"),
                ParameterSpec::input_file("sai_file1", "Path to .sai file for read 1"),
                ParameterSpec::input_file("sai_file2", "Path to .sai file for read 2"),
                ParameterSpec::input_file("reads1", "Path to reads file 1"),
                ParameterSpec::input_file("reads2", "Path to reads file 2"),
            ],
        },
    ];
}

/// All operations, in declaration order
pub fn catalog() -> &'static [OperationSpec] {
    &CATALOG
}

/// Find an operation by its tool name
pub fn lookup(name: &str) -> Option<&'static OperationSpec> {
    CATALOG.iter().find(|op| op.name() == name)
}

/// Comma-separated list of operation names, for error messages
pub fn operation_names() -> String {
    CATALOG
        .iter()
        .map(OperationSpec::name)
        .collect::<Vec<_>>()
        .join(", ")
}
