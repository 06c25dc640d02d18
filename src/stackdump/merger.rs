use crate::core::strings::{self, StringInterner};
use crate::core::types::ProfileError;
use crate::proto::profpack::{Frame, MergedStackDump, StackDump, StackTrace};

/// Concatenates stack dumps. Stacks and frames are kept as they are; only the frame strings are
/// moved into one shared table.
pub struct StackDumpMerger {
    strings: StringInterner,
    merged: MergedStackDump,
}

impl Default for StackDumpMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl StackDumpMerger {
    pub fn new() -> Self {
        StackDumpMerger {
            strings: StringInterner::new(),
            merged: MergedStackDump::default(),
        }
    }

    pub fn merge(mut self, dumps: &[StackDump]) -> Result<MergedStackDump, ProfileError> {
        self.merged.totals = dumps.iter().map(|d| d.total).collect();
        self.merged.num_stack_traces =
            dumps.iter().map(|d| d.stack_traces.len() as u64).collect();
        self.merged.stack_traces =
            Vec::with_capacity(dumps.iter().map(|d| d.stack_traces.len()).sum());

        for (index, dump) in dumps.iter().enumerate() {
            for stack in &dump.stack_traces {
                let frames = stack
                    .frames
                    .iter()
                    .map(|frame| self.remap_frame(index, frame, &dump.string_table))
                    .collect::<Result<Vec<_>, ProfileError>>()?;
                self.merged.stack_traces.push(StackTrace {
                    total: stack.total,
                    pc: stack.pc.clone(),
                    frames,
                });
            }
            trace!("merged stack dump {}: {} stack traces", index, dump.stack_traces.len());
        }

        let mut merged = self.merged;
        merged.string_table = self.strings.into_table();
        debug!(
            "merged {} stack dumps: {} stack traces, {} strings",
            dumps.len(),
            merged.stack_traces.len(),
            merged.string_table.len()
        );
        Ok(merged)
    }

    fn remap_frame(
        &mut self,
        input: usize,
        frame: &Frame,
        table: &[String],
    ) -> Result<Frame, ProfileError> {
        let mut string = |id: u64| {
            let value = i64::try_from(id)
                .ok()
                .and_then(|id| strings::lookup(table, id))
                .ok_or(ProfileError::InvalidReference {
                    input,
                    kind: "string",
                    id,
                })?;
            Ok::<u64, ProfileError>(self.strings.intern(value))
        };
        Ok(Frame {
            function_name: string(frame.function_name)?,
            filename: string(frame.filename)?,
            ..frame.clone()
        })
    }
}

/// Merges `dumps` in order using a fresh merge session.
pub fn merge(dumps: &[StackDump]) -> Result<MergedStackDump, ProfileError> {
    StackDumpMerger::new().merge(dumps)
}
