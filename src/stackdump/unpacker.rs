use crate::core::slicing::{check_index, window};
use crate::core::strings::{self, StringInterner};
use crate::core::types::ProfileError;
use crate::proto::profpack::{Frame, MergedStackDump, StackDump, StackTrace};

pub struct StackDumpUnpacker<'a> {
    merged: &'a MergedStackDump,
}

impl<'a> StackDumpUnpacker<'a> {
    pub fn new(merged: &'a MergedStackDump) -> Self {
        StackDumpUnpacker { merged }
    }

    /// Reconstructs input `index` with its own string table, filled in the order the frames
    /// reference it.
    pub fn unpack(&self, index: usize) -> Result<StackDump, ProfileError> {
        let m = self.merged;
        check_index("num_stack_traces", index, m.num_stack_traces.len())?;
        check_index("totals", index, m.totals.len())?;

        let range =
            window(&m.num_stack_traces, index, 1, m.stack_traces.len(), "stack_traces")?;
        let mut strings = StringInterner::new();
        let mut stack_traces = Vec::with_capacity(range.len());
        for stack in &m.stack_traces[range] {
            let frames = stack
                .frames
                .iter()
                .map(|frame| {
                    Ok(Frame {
                        function_name: self.remap(&mut strings, frame.function_name)?,
                        filename: self.remap(&mut strings, frame.filename)?,
                        ..frame.clone()
                    })
                })
                .collect::<Result<Vec<_>, ProfileError>>()?;
            stack_traces.push(StackTrace {
                total: stack.total,
                pc: stack.pc.clone(),
                frames,
            });
        }

        Ok(StackDump {
            total: m.totals[index],
            stack_traces,
            string_table: strings.into_table(),
        })
    }

    fn remap(&self, strings: &mut StringInterner, id: u64) -> Result<u64, ProfileError> {
        let value = i64::try_from(id)
            .ok()
            .and_then(|id| strings::lookup(&self.merged.string_table, id))
            .ok_or_else(|| {
                ProfileError::decode(format!("string id {} is not in the string table", id))
            })?;
        Ok(strings.intern(value))
    }
}

/// Unpacks input `index` of `merged`.
pub fn unpack(merged: &MergedStackDump, index: usize) -> Result<StackDump, ProfileError> {
    StackDumpUnpacker::new(merged).unpack(index)
}
