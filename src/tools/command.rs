//! Command Construction
//!
//! Maps a validated invocation onto an explicit `bwa` argument vector. The
//! vector is handed straight to process creation, never to a shell, so file
//! names are passed through byte-for-byte whatever characters they contain.

use super::catalog::OperationId;
use super::validator::{index_file, BwaInvocation, ValidatedArguments};
use crate::config::Config;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Suffixes of the files `bwa index` writes beside its input
pub const INDEX_SUFFIXES: &[&str] = &["amb", "ann", "bwt", "pac", "sa"];

/// A fully resolved, ready-to-execute aligner run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    /// Operation this plan executes
    pub operation: OperationId,

    /// Aligner binary
    pub executable: PathBuf,

    /// Arguments after the executable, subcommand first
    pub args: Vec<OsString>,

    /// Working directory for the child (the configured temp directory)
    pub working_dir: PathBuf,

    /// File receiving the child's stdout, when the output is a byte stream
    pub output_redirect: Option<PathBuf>,

    /// Artifact whose presence and size decide success
    pub expected_output: PathBuf,

    /// Every artifact the run should leave behind
    pub artifacts: Vec<PathBuf>,

    /// Operation-specific notes for the success summary
    pub notes: Vec<String>,
}

impl CommandPlan {
    /// Short printable form for logs
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.executable.display().to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        format!("{parts:?}")
    }
}

/// Build a plan with a freshly generated output token
pub fn build(validated: &ValidatedArguments, config: &Config) -> CommandPlan {
    build_with_token(validated, config, &Uuid::new_v4().to_string())
}

/// Build a plan using `token` to name any redirected output
///
/// Deterministic in its inputs; `build` supplies a random token so that
/// concurrent invocations never share an output path.
pub fn build_with_token(validated: &ValidatedArguments, config: &Config, token: &str) -> CommandPlan {
    let operation = validated.operation;
    let output_in_temp =
        |ext: &str| config.temp_dir.join(format!("{}-{}.{}", operation.name(), token, ext));

    let mut args: Vec<OsString> = vec![operation.subcommand().into()];
    let mut notes = Vec::new();

    let (output_redirect, expected_output, artifacts) = match &validated.invocation {
        BwaInvocation::Index {
            reference_fasta,
            algorithm,
        } => {
            push_all(&mut args, ["-a", algorithm.as_str()]);
            args.push(reference_fasta.into());
            notes.push(format!("Algorithm: {}", algorithm.as_str()));
            let artifacts: Vec<PathBuf> = INDEX_SUFFIXES
                .iter()
                .map(|suffix| with_suffix(reference_fasta, suffix))
                .collect();
            (None, index_file(reference_fasta), artifacts)
        }
        BwaInvocation::Mem {
            reference,
            reads1,
            reads2,
            threads,
            min_seed_length,
            band_width,
            read_group,
        } => {
            push_flag(&mut args, "-t", threads);
            push_flag(&mut args, "-k", min_seed_length);
            push_flag(&mut args, "-w", band_width);
            if let Some(rg) = read_group {
                push_all(&mut args, ["-R", rg.as_str()]);
            }
            push_paths(&mut args, [reference, reads1]);
            if let Some(reads2) = reads2 {
                args.push(reads2.into());
            }
            notes.push(format!("Threads used: {threads}"));
            notes.push(format!(
                "Paired-end: {}",
                if reads2.is_some() { "yes" } else { "no" }
            ));
            let out = output_in_temp("sam");
            (Some(out.clone()), out.clone(), vec![out])
        }
        BwaInvocation::Aln {
            reference,
            reads,
            threads,
            max_mismatches,
            max_gap_opens,
        } => {
            push_flag(&mut args, "-t", threads);
            push_flag(&mut args, "-n", max_mismatches);
            push_flag(&mut args, "-o", max_gap_opens);
            push_paths(&mut args, [reference, reads]);
            notes.push("Use bwa_samse/bwa_sampe to convert the .sai output to SAM".to_string());
            let out = output_in_temp("sai");
            (Some(out.clone()), out.clone(), vec![out])
        }
        BwaInvocation::Samse {
            reference,
            sai_file,
            reads,
        } => {
            push_paths(&mut args, [reference, sai_file, reads]);
            let out = output_in_temp("sam");
            (Some(out.clone()), out.clone(), vec![out])
        }
        BwaInvocation::Sampe {
            reference,
            sai_file1,
            sai_file2,
            reads1,
            reads2,
        } => {
            push_paths(&mut args, [reference, sai_file1, sai_file2, reads1, reads2]);
            let out = output_in_temp("sam");
            (Some(out.clone()), out.clone(), vec![out])
        }
    };

    CommandPlan {
        operation,
        executable: config.bwa_path.clone(),
        args,
        working_dir: config.temp_dir.clone(),
        output_redirect,
        expected_output,
        artifacts,
        notes,
    }
}

fn push_flag(args: &mut Vec<OsString>, flag: &str, value: &u32) {
    args.push(flag.into());
    args.push(value.to_string().into());
}

fn push_all<'a>(args: &mut Vec<OsString>, values: impl IntoIterator<Item = &'a str>) {
    args.extend(values.into_iter().map(OsString::from));
}

fn push_paths<'a>(args: &mut Vec<OsString>, paths: impl IntoIterator<Item = &'a PathBuf>) {
    args.extend(paths.into_iter().map(|p| p.as_os_str().to_os_string()));
}

/// `<path>.<suffix>` without replacing an existing extension
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(OsStr::new("."));
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::catalog::{lookup, ArgValue};
    use crate::tools::validator::IndexAlgorithm;
    use std::collections::BTreeMap;

    fn config() -> Config {
        Config {
            temp_dir: PathBuf::from("/scratch"),
            bwa_path: PathBuf::from("/usr/bin/bwa"),
            ..Config::default()
        }
    }

    fn validated(invocation: BwaInvocation) -> ValidatedArguments {
        let operation = match &invocation {
            BwaInvocation::Index { .. } => OperationId::Index,
            BwaInvocation::Mem { .. } => OperationId::Mem,
            BwaInvocation::Aln { .. } => OperationId::Aln,
            BwaInvocation::Samse { .. } => OperationId::Samse,
            BwaInvocation::Sampe { .. } => OperationId::Sampe,
        };
        assert!(lookup(operation.name()).is_some());
        ValidatedArguments {
            operation,
            normalized: BTreeMap::<&'static str, ArgValue>::new(),
            invocation,
        }
    }

    fn args_of(plan: &CommandPlan) -> Vec<String> {
        plan.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_index_plan() {
        let plan = build_with_token(
            &validated(BwaInvocation::Index {
                reference_fasta: PathBuf::from("/ref/genome.fa"),
                algorithm: IndexAlgorithm::Is,
            }),
            &config(),
            "tok",
        );

        assert_eq!(plan.executable, PathBuf::from("/usr/bin/bwa"));
        assert_eq!(args_of(&plan), vec!["index", "-a", "is", "/ref/genome.fa"]);
        assert_eq!(plan.output_redirect, None);
        assert_eq!(plan.expected_output, PathBuf::from("/ref/genome.fa.bwt"));
        assert_eq!(plan.artifacts.len(), 5);
        assert!(plan.artifacts.contains(&PathBuf::from("/ref/genome.fa.sa")));
        assert_eq!(plan.working_dir, PathBuf::from("/scratch"));
    }

    #[test]
    fn test_mem_plan_flag_order() {
        let plan = build_with_token(
            &validated(BwaInvocation::Mem {
                reference: PathBuf::from("/ref/genome.fa"),
                reads1: PathBuf::from("/reads/r1.fastq"),
                reads2: Some(PathBuf::from("/reads/r2.fastq")),
                threads: 8,
                min_seed_length: 19,
                band_width: 100,
                read_group: Some("@RG\\tID:s1".to_string()),
            }),
            &config(),
            "tok",
        );

        assert_eq!(
            args_of(&plan),
            vec![
                "mem", "-t", "8", "-k", "19", "-w", "100", "-R", "@RG\\tID:s1",
                "/ref/genome.fa", "/reads/r1.fastq", "/reads/r2.fastq"
            ]
        );
        let out = PathBuf::from("/scratch/bwa_mem-tok.sam");
        assert_eq!(plan.output_redirect, Some(out.clone()));
        assert_eq!(plan.expected_output, out);
        assert!(plan.notes.iter().any(|n| n == "Paired-end: yes"));
    }

    #[test]
    fn test_mem_single_end_without_read_group() {
        let plan = build_with_token(
            &validated(BwaInvocation::Mem {
                reference: PathBuf::from("/ref/genome.fa"),
                reads1: PathBuf::from("/reads/r1.fastq"),
                reads2: None,
                threads: 4,
                min_seed_length: 19,
                band_width: 100,
                read_group: None,
            }),
            &config(),
            "tok",
        );
        assert_eq!(
            args_of(&plan),
            vec!["mem", "-t", "4", "-k", "19", "-w", "100", "/ref/genome.fa", "/reads/r1.fastq"]
        );
        assert!(plan.notes.iter().any(|n| n == "Paired-end: no"));
    }

    #[test]
    fn test_aln_writes_sai() {
        let plan = build_with_token(
            &validated(BwaInvocation::Aln {
                reference: PathBuf::from("/ref/genome.fa"),
                reads: PathBuf::from("/reads/r1.fastq"),
                threads: 4,
                max_mismatches: 4,
                max_gap_opens: 1,
            }),
            &config(),
            "tok",
        );
        assert_eq!(
            args_of(&plan),
            vec!["aln", "-t", "4", "-n", "4", "-o", "1", "/ref/genome.fa", "/reads/r1.fastq"]
        );
        assert_eq!(plan.output_redirect, Some(PathBuf::from("/scratch/bwa_aln-tok.sai")));
    }

    #[test]
    fn test_samse_and_sampe_positional_order() {
        let samse = build_with_token(
            &validated(BwaInvocation::Samse {
                reference: PathBuf::from("ref"),
                sai_file: PathBuf::from("a.sai"),
                reads: PathBuf::from("r.fq"),
            }),
            &config(),
            "tok",
        );
        assert_eq!(args_of(&samse), vec!["samse", "ref", "a.sai", "r.fq"]);

        let sampe = build_with_token(
            &validated(BwaInvocation::Sampe {
                reference: PathBuf::from("ref"),
                sai_file1: PathBuf::from("1.sai"),
                sai_file2: PathBuf::from("2.sai"),
                reads1: PathBuf::from("r1.fq"),
                reads2: PathBuf::from("r2.fq"),
            }),
            &config(),
            "tok",
        );
        assert_eq!(
            args_of(&sampe),
            vec!["sampe", "ref", "1.sai", "2.sai", "r1.fq", "r2.fq"]
        );
        assert_eq!(sampe.output_redirect, Some(PathBuf::from("/scratch/bwa_sampe-tok.sam")));
    }

    #[test]
    fn test_paths_are_single_arguments() {
        let plan = build_with_token(
            &validated(BwaInvocation::Samse {
                reference: PathBuf::from("/ref/my genome;$(id).fa"),
                sai_file: PathBuf::from("a.sai"),
                reads: PathBuf::from("r.fq"),
            }),
            &config(),
            "tok",
        );
        assert_eq!(plan.args[1], OsString::from("/ref/my genome;$(id).fa"));
        assert_eq!(plan.args.len(), 4);
    }

    #[test]
    fn test_build_generates_distinct_outputs() {
        let v = validated(BwaInvocation::Samse {
            reference: PathBuf::from("ref"),
            sai_file: PathBuf::from("a.sai"),
            reads: PathBuf::from("r.fq"),
        });
        let a = build(&v, &config());
        let b = build(&v, &config());
        assert_ne!(a.output_redirect, b.output_redirect);
        assert_eq!(a.args, b.args);
    }

    #[test]
    fn test_build_is_deterministic_for_a_token() {
        let v = validated(BwaInvocation::Index {
            reference_fasta: PathBuf::from("/ref/genome.fa"),
            algorithm: IndexAlgorithm::Bwtsw,
        });
        assert_eq!(build_with_token(&v, &config(), "x"), build_with_token(&v, &config(), "x"));
    }

    #[test]
    fn test_display_command() {
        let plan = build_with_token(
            &validated(BwaInvocation::Index {
                reference_fasta: PathBuf::from("/ref/genome.fa"),
                algorithm: IndexAlgorithm::Bwtsw,
            }),
            &config(),
            "tok",
        );
        assert_eq!(
            plan.display_command(),
            r#"["/usr/bin/bwa", "index", "-a", "bwtsw", "/ref/genome.fa"]"#
        );
    }
}
