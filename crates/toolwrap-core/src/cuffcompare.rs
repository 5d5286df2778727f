//! Cuffcompare tool profile.
//!
//! Builds an [`Invocation`] for
//! `cuffcompare -o cc_output [-r <annotation>] [-R] [-s <sequence>] input1.gtf [input2.gtf]`.
//! Inputs are staged with a `.gtf` extension so cuffcompare writes its
//! per-input `.tmap`/`.refmap` files next to them inside the workspace.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::command::{CommandTemplate, ToolOption};
use crate::error::{SandboxError, SandboxResult};
use crate::invocation::Invocation;
use crate::publish::OutputMapping;
use crate::reference::ReferenceRequest;
use crate::staging::InputSpec;

pub const PROGRAM: &str = "cuffcompare";
pub const OUTPUT_PREFIX: &str = "cc_output";
/// Marker identifying the version banner line.
pub const VERSION_MARKER: &str = "cuffcompare v";

pub const INPUT1_STAGED_NAME: &str = "input1.gtf";
pub const INPUT2_STAGED_NAME: &str = "input2.gtf";

/// Caller destinations, one per artifact cuffcompare can produce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuffcompareOutputs {
    pub accuracy: Option<PathBuf>,
    pub combined: Option<PathBuf>,
    pub tracking: Option<PathBuf>,
    pub input1_tmap: Option<PathBuf>,
    pub input1_refmap: Option<PathBuf>,
    pub input2_tmap: Option<PathBuf>,
    pub input2_refmap: Option<PathBuf>,
}

struct ArtifactSlot<'a> {
    artifact: &'static str,
    /// Name of the command-line option supplying the destination.
    option: &'static str,
    needs_second_input: bool,
    destination: &'a Option<PathBuf>,
}

impl CuffcompareOutputs {
    fn slots(&self) -> [ArtifactSlot<'_>; 7] {
        [
            ArtifactSlot {
                artifact: "cc_output",
                option: "transcripts-accuracy-output",
                needs_second_input: false,
                destination: &self.accuracy,
            },
            ArtifactSlot {
                artifact: "input1.tmap",
                option: "input1-tmap-output",
                needs_second_input: false,
                destination: &self.input1_tmap,
            },
            ArtifactSlot {
                artifact: "input1.refmap",
                option: "input1-refmap-output",
                needs_second_input: false,
                destination: &self.input1_refmap,
            },
            ArtifactSlot {
                artifact: "cc_output.combined.gtf",
                option: "transcripts-combined-output",
                needs_second_input: false,
                destination: &self.combined,
            },
            ArtifactSlot {
                artifact: "cc_output.tracking",
                option: "transcripts-tracking-output",
                needs_second_input: true,
                destination: &self.tracking,
            },
            ArtifactSlot {
                artifact: "input2.tmap",
                option: "input2-tmap-output",
                needs_second_input: true,
                destination: &self.input2_tmap,
            },
            ArtifactSlot {
                artifact: "input2.refmap",
                option: "input2-refmap-output",
                needs_second_input: true,
                destination: &self.input2_refmap,
            },
        ]
    }
}

/// Fully resolved options for one cuffcompare run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuffcompareRequest {
    /// Executable to run (name on `PATH` or a path).
    pub program: String,
    /// Reference annotation GTF (`-r`).
    pub ref_annotation: Option<PathBuf>,
    /// Ignore reference transcripts not overlapped by any input (`-R`).
    pub ignore_nonoverlap: bool,
    /// Genomic sequence lookup (`-s`).
    pub sequence: Option<ReferenceRequest>,
    pub input1: PathBuf,
    pub input2: Option<PathBuf>,
    pub outputs: CuffcompareOutputs,
}

impl CuffcompareRequest {
    pub fn new(input1: impl Into<PathBuf>) -> Self {
        Self {
            program: PROGRAM.to_string(),
            ref_annotation: None,
            ignore_nonoverlap: false,
            sequence: None,
            input1: input1.into(),
            input2: None,
            outputs: CuffcompareOutputs::default(),
        }
    }

    pub fn has_two_inputs(&self) -> bool {
        self.input2.is_some()
    }

    /// Translate into a generic invocation.
    ///
    /// Artifacts that need a second input are required when one is given and
    /// optional otherwise (only mapped if a destination was supplied). Every
    /// other artifact needs a destination.
    pub fn into_invocation(self) -> SandboxResult<Invocation> {
        let two_inputs = self.has_two_inputs();

        let mut outputs = Vec::new();
        for slot in self.outputs.slots() {
            let required = two_inputs || !slot.needs_second_input;
            match (slot.destination, required) {
                (Some(dest), true) => outputs.push(OutputMapping::required(slot.artifact, dest)),
                (Some(dest), false) => outputs.push(OutputMapping::optional(slot.artifact, dest)),
                (None, true) => {
                    return Err(SandboxError::configuration(format!(
                        "no destination given for {} (--{})",
                        slot.artifact, slot.option
                    )))
                }
                (None, false) => {}
            }
        }

        let mut template = CommandTemplate::new(self.program, "-o", OUTPUT_PREFIX);
        if let Some(annotation) = self.ref_annotation {
            template = template.option(ToolOption::path("-r", annotation));
        }
        if self.ignore_nonoverlap {
            template = template.option(ToolOption::switch("-R"));
        }
        if self.sequence.is_some() {
            template = template.option(ToolOption::reference("-s"));
        }

        let mut invocation =
            Invocation::new(template).input(InputSpec::new(self.input1, INPUT1_STAGED_NAME));
        if let Some(input2) = self.input2 {
            invocation = invocation.input(InputSpec::new(input2, INPUT2_STAGED_NAME));
        }
        if let Some(sequence) = self.sequence {
            invocation = invocation.reference(sequence);
        }
        invocation.outputs = outputs;
        Ok(invocation)
    }
}
