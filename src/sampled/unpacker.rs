use crate::core::slicing::{check_index, window};
use crate::core::strings::{self, StringInterner};
use crate::core::types::ProfileError;
use crate::proto::pprofs::{Function, Label, Line, Location, Mapping, Profile, Sample, ValueType};
use crate::proto::profpack::MergedProfile;

/// Slices single profiles back out of a merged artifact. Holds no state between calls, so any
/// number of inputs can be unpacked from the same artifact in any order.
pub struct ProfileUnpacker<'a> {
    merged: &'a MergedProfile,
}

impl<'a> ProfileUnpacker<'a> {
    pub fn new(merged: &'a MergedProfile) -> Self {
        ProfileUnpacker { merged }
    }

    /// Reconstructs input `index`. Only the mappings, locations and functions its samples reach
    /// are emitted, renumbered from 1 in the order they are first touched.
    pub fn unpack(&self, index: usize) -> Result<Profile, ProfileError> {
        let m = self.merged;
        check_index("num_sample_types", index, m.num_sample_types.len())?;
        check_index("num_samples", index, m.num_samples.len())?;
        check_index("period_types", index, m.period_types.len() / 2)?;
        check_index("periods", index, m.periods.len())?;
        check_index("durations_nanos", index, m.durations_nanos.len())?;
        check_index("times_nanos", index, m.times_nanos.len())?;

        let sample_types =
            window(&m.num_sample_types, index, 2, m.sample_type.len(), "sample_type")?;
        let samples = window(&m.num_samples, index, 1, m.samples.len(), "samples")?;

        let mut rebuild = Reconstruction::new(m);
        let sample_type = m.sample_type[sample_types]
            .chunks_exact(2)
            .map(|pair| {
                Ok(ValueType {
                    r#type: rebuild.string(pair[0])?,
                    unit: rebuild.string(pair[1])?,
                })
            })
            .collect::<Result<Vec<_>, ProfileError>>()?;

        let mut sample = Vec::with_capacity(samples.len());
        for position in samples {
            let src = &m.samples[position];
            let location_id = src
                .location_id
                .iter()
                .map(|id| rebuild.location(*id))
                .collect::<Result<Vec<_>, ProfileError>>()?;
            let label = match m.labels.get(&(position as u64)) {
                Some(set) => set
                    .label
                    .iter()
                    .map(|l| rebuild.label(l))
                    .collect::<Result<Vec<_>, ProfileError>>()?,
                None => Vec::new(),
            };
            sample.push(Sample {
                location_id,
                value: src.value.clone(),
                label,
            });
        }

        let period_type = match (m.period_types[index * 2], m.period_types[index * 2 + 1]) {
            (0, 0) => None,
            (r#type, unit) => Some(ValueType {
                r#type: rebuild.string(r#type)?,
                unit: rebuild.string(unit)?,
            }),
        };

        trace!(
            "unpacked input {}: {} samples, {} locations",
            index,
            sample.len(),
            rebuild.locations.len()
        );

        Ok(Profile {
            sample_type,
            sample,
            mapping: rebuild.mappings,
            location: rebuild.locations,
            function: rebuild.functions,
            string_table: rebuild.strings.into_table(),
            time_nanos: m.times_nanos[index],
            duration_nanos: m.durations_nanos[index],
            period_type,
            period: m.periods[index],
            ..Profile::default()
        })
    }
}

/// Local numbering for one unpack call. Each cache maps a pooled id to the local id it was given.
struct Reconstruction<'a> {
    merged: &'a MergedProfile,
    strings: StringInterner,
    mapping_ids: Vec<Option<u64>>,
    function_ids: Vec<Option<u64>>,
    location_ids: Vec<Option<u64>>,
    mappings: Vec<Mapping>,
    functions: Vec<Function>,
    locations: Vec<Location>,
}

impl<'a> Reconstruction<'a> {
    fn new(merged: &'a MergedProfile) -> Self {
        Reconstruction {
            merged,
            strings: StringInterner::new(),
            mapping_ids: vec![None; merged.mappings.len()],
            function_ids: vec![None; merged.functions.len()],
            location_ids: vec![None; merged.locations.len()],
            mappings: Vec::new(),
            functions: Vec::new(),
            locations: Vec::new(),
        }
    }

    fn string(&mut self, id: i64) -> Result<i64, ProfileError> {
        let value = strings::lookup(&self.merged.string_table, id).ok_or_else(|| {
            ProfileError::decode(format!("string id {} is not in the string table", id))
        })?;
        Ok(self.strings.intern(value) as i64)
    }

    fn label(&mut self, label: &Label) -> Result<Label, ProfileError> {
        Ok(Label {
            key: self.string(label.key)?,
            str: self.string(label.str)?,
            num: label.num,
            num_unit: self.string(label.num_unit)?,
        })
    }

    fn location(&mut self, pooled: u64) -> Result<u64, ProfileError> {
        let slot = slot(pooled, self.location_ids.len(), "location")?;
        if let Some(local) = self.location_ids[slot] {
            return Ok(local);
        }
        let merged = self.merged;
        let src = &merged.locations[slot];

        let mapping_id = match src.mapping_id {
            0 => 0,
            id => self.mapping(id)?,
        };
        let mut line = Vec::with_capacity(src.line.len());
        for l in &src.line {
            let function_id = match l.function_id {
                0 => 0,
                id => self.function(id)?,
            };
            line.push(Line {
                function_id,
                line: l.line,
            });
        }

        let local = self.locations.len() as u64 + 1;
        self.locations.push(Location {
            id: local,
            mapping_id,
            address: src.address,
            line,
            is_folded: src.is_folded,
        });
        self.location_ids[slot] = Some(local);
        Ok(local)
    }

    fn mapping(&mut self, pooled: u64) -> Result<u64, ProfileError> {
        let slot = slot(pooled, self.mapping_ids.len(), "mapping")?;
        if let Some(local) = self.mapping_ids[slot] {
            return Ok(local);
        }
        let merged = self.merged;
        let src = &merged.mappings[slot];
        let local = self.mappings.len() as u64 + 1;
        let mapping = Mapping {
            id: local,
            filename: self.string(src.filename)?,
            build_id: self.string(src.build_id)?,
            ..src.clone()
        };
        self.mappings.push(mapping);
        self.mapping_ids[slot] = Some(local);
        Ok(local)
    }

    fn function(&mut self, pooled: u64) -> Result<u64, ProfileError> {
        let slot = slot(pooled, self.function_ids.len(), "function")?;
        if let Some(local) = self.function_ids[slot] {
            return Ok(local);
        }
        let merged = self.merged;
        let src = &merged.functions[slot];
        let local = self.functions.len() as u64 + 1;
        let function = Function {
            id: local,
            name: self.string(src.name)?,
            system_name: self.string(src.system_name)?,
            filename: self.string(src.filename)?,
            start_line: src.start_line,
        };
        self.functions.push(function);
        self.function_ids[slot] = Some(local);
        Ok(local)
    }
}

/// Pooled ids start at 1, so id `n` lives at `n - 1`.
fn slot(pooled: u64, len: usize, kind: &str) -> Result<usize, ProfileError> {
    match usize::try_from(pooled) {
        Ok(id) if id >= 1 && id <= len => Ok(id - 1),
        _ => Err(ProfileError::decode(format!("{} id {} is not pooled", kind, pooled))),
    }
}

/// Unpacks input `index` of `merged`.
pub fn unpack(merged: &MergedProfile, index: usize) -> Result<Profile, ProfileError> {
    ProfileUnpacker::new(merged).unpack(index)
}
