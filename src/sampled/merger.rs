use rustc_hash::FxHashMap;

use crate::core::config::{Config, MappingKeyPolicy};
use crate::core::strings::{self, StringInterner};
use crate::core::types::ProfileError;
use crate::proto::pprofs::{Function, Label, Line, Location, Mapping, Profile, Sample};
use crate::proto::profpack::{LabelSet, MergedProfile};

use super::pool::{FunctionKey, LocationKey, MappingKey, Pool};

/// Read-only view of one input profile, resolving its own ids to its own records.
pub(crate) struct InputProfile<'p> {
    index: usize,
    profile: &'p Profile,
    functions: FxHashMap<u64, &'p Function>,
    mappings: FxHashMap<u64, &'p Mapping>,
    locations: FxHashMap<u64, &'p Location>,
}

impl<'p> InputProfile<'p> {
    pub(crate) fn new(index: usize, profile: &'p Profile) -> Self {
        InputProfile {
            index,
            profile,
            functions: profile.function.iter().map(|f| (f.id, f)).collect(),
            mappings: profile.mapping.iter().map(|m| (m.id, m)).collect(),
            locations: profile.location.iter().map(|l| (l.id, l)).collect(),
        }
    }

    fn string(&self, id: i64) -> Result<&'p str, ProfileError> {
        let profile: &'p Profile = self.profile;
        strings::lookup(&profile.string_table, id)
            .ok_or_else(|| self.invalid("string", id as u64))
    }

    fn function(&self, id: u64) -> Result<&'p Function, ProfileError> {
        self.functions
            .get(&id)
            .copied()
            .ok_or_else(|| self.invalid("function", id))
    }

    fn mapping(&self, id: u64) -> Result<&'p Mapping, ProfileError> {
        self.mappings
            .get(&id)
            .copied()
            .ok_or_else(|| self.invalid("mapping", id))
    }

    fn location(&self, id: u64) -> Result<&'p Location, ProfileError> {
        self.locations
            .get(&id)
            .copied()
            .ok_or_else(|| self.invalid("location", id))
    }

    fn invalid(&self, kind: &'static str, id: u64) -> ProfileError {
        ProfileError::InvalidReference {
            input: self.index,
            kind,
            id,
        }
    }
}

/// One merge session: the string table and the three pools accumulate while inputs are merged,
/// then everything is frozen into a `MergedProfile`. A merger is consumed by `merge`.
pub struct ProfileMerger {
    mapping_key: MappingKeyPolicy,
    strings: StringInterner,
    functions: Pool<FunctionKey, Function>,
    mappings: Pool<MappingKey, Mapping>,
    locations: Pool<LocationKey, Location>,
    merged: MergedProfile,
}

impl ProfileMerger {
    pub fn new(config: &Config) -> Self {
        ProfileMerger {
            mapping_key: config.mapping_key,
            strings: StringInterner::new(),
            functions: Pool::new(),
            mappings: Pool::new(),
            locations: Pool::new(),
            merged: MergedProfile::default(),
        }
    }

    pub fn merge(mut self, profiles: &[Profile]) -> Result<MergedProfile, ProfileError> {
        let k = profiles.len();
        let merged = &mut self.merged;
        merged.num_functions = profiles.iter().map(|p| p.function.len() as u64).collect();
        merged.num_locations = profiles.iter().map(|p| p.location.len() as u64).collect();
        merged.num_mappings = profiles.iter().map(|p| p.mapping.len() as u64).collect();
        merged.num_sample_types = profiles.iter().map(|p| p.sample_type.len() as u64).collect();
        merged.num_samples = profiles.iter().map(|p| p.sample.len() as u64).collect();

        merged.samples.reserve(profiles.iter().map(|p| p.sample.len()).sum());
        merged.periods.reserve(k);
        merged.period_types.reserve(k * 2);
        merged.durations_nanos.reserve(k);
        merged.times_nanos.reserve(k);

        if let Some(first) = profiles.first() {
            if profiles
                .iter()
                .any(|p| p.sample_type.len() != first.sample_type.len())
            {
                warn!(
                    "merging profiles with differing numbers of sample types; \
                     values will not line up across inputs"
                );
            }
        }

        for (index, profile) in profiles.iter().enumerate() {
            let input = InputProfile::new(index, profile);
            self.merge_one(&input)?;
            trace!(
                "merged input {}: {} samples, {} locations",
                index,
                profile.sample.len(),
                profile.location.len()
            );
        }

        debug!(
            "merged {} profiles: {} samples, {} locations, {} functions, {} mappings, {} strings",
            k,
            self.merged.samples.len(),
            self.locations.len(),
            self.functions.len(),
            self.mappings.len(),
            self.strings.len()
        );

        let mut merged = self.merged;
        merged.functions = self.functions.into_records();
        merged.mappings = self.mappings.into_records();
        merged.locations = self.locations.into_records();
        merged.string_table = self.strings.into_table();
        Ok(merged)
    }

    fn merge_one(&mut self, input: &InputProfile) -> Result<(), ProfileError> {
        let profile = input.profile;

        for vt in &profile.sample_type {
            let r#type = self.put_string(input, vt.r#type)?;
            let unit = self.put_string(input, vt.unit)?;
            self.merged.sample_type.extend([r#type, unit]);
        }

        let (period_type, period_unit) = match &profile.period_type {
            Some(vt) => (self.put_string(input, vt.r#type)?, self.put_string(input, vt.unit)?),
            None => (0, 0),
        };
        self.merged.period_types.extend([period_type, period_unit]);
        self.merged.periods.push(profile.period);
        self.merged.durations_nanos.push(profile.duration_nanos);
        self.merged.times_nanos.push(profile.time_nanos);

        // source location id -> pooled location id, for this input only
        let mut seen_locations: FxHashMap<u64, u64> = FxHashMap::default();
        for sample in &profile.sample {
            let mut location_id = Vec::with_capacity(sample.location_id.len());
            for id in &sample.location_id {
                let pooled = match seen_locations.get(id) {
                    Some(pooled) => *pooled,
                    None => {
                        let pooled = self.put_location(input, input.location(*id)?)?;
                        seen_locations.insert(*id, pooled);
                        pooled
                    }
                };
                location_id.push(pooled);
            }
            self.merged.samples.push(Sample {
                location_id,
                value: sample.value.clone(),
                label: Vec::new(),
            });

            if !sample.label.is_empty() {
                let position = self.merged.samples.len() as u64 - 1;
                let labels = self.put_labels(input, &sample.label)?;
                self.merged.labels.insert(position, labels);
            }
        }
        Ok(())
    }

    fn put_string(&mut self, input: &InputProfile, id: i64) -> Result<i64, ProfileError> {
        Ok(self.strings.intern(input.string(id)?) as i64)
    }

    fn put_labels(
        &mut self,
        input: &InputProfile,
        labels: &[Label],
    ) -> Result<LabelSet, ProfileError> {
        let label = labels
            .iter()
            .map(|l| {
                Ok(Label {
                    key: self.put_string(input, l.key)?,
                    str: self.put_string(input, l.str)?,
                    num: l.num,
                    num_unit: self.put_string(input, l.num_unit)?,
                })
            })
            .collect::<Result<Vec<_>, ProfileError>>()?;
        Ok(LabelSet { label })
    }

    fn put_function(&mut self, input: &InputProfile, src: &Function) -> Result<u64, ProfileError> {
        let key = FunctionKey {
            name: self.strings.intern(input.string(src.name)?),
            system_name: self.strings.intern(input.string(src.system_name)?),
            filename: self.strings.intern(input.string(src.filename)?),
            start_line: src.start_line,
        };
        Ok(self.functions.put(key, |id| Function {
            id,
            name: key.name as i64,
            system_name: key.system_name as i64,
            filename: key.filename as i64,
            start_line: key.start_line,
        }))
    }

    /// Returns the pooled mapping id and how far the pooled mapping's start lies from `src`'s.
    /// The distance is only non-zero when the key policy lets relocated mappings share an entry.
    fn put_mapping(
        &mut self,
        input: &InputProfile,
        src: &Mapping,
    ) -> Result<(u64, u64), ProfileError> {
        let filename = self.strings.intern(input.string(src.filename)?);
        let build_id = self.strings.intern(input.string(src.build_id)?);
        let key = MappingKey::new(
            self.mapping_key,
            src.memory_start,
            src.memory_limit,
            src.file_offset,
            filename,
            build_id,
        );
        let id = self.mappings.put(key, |id| Mapping {
            id,
            filename: filename as i64,
            build_id: build_id as i64,
            ..src.clone()
        });
        let delta = match self.mappings.record(id) {
            Some(pooled) => pooled.memory_start.wrapping_sub(src.memory_start),
            None => 0,
        };
        Ok((id, delta))
    }

    /// Pools a location, pooling its mapping and line functions first so that dependencies
    /// always get lower ids than the locations that reference them. The address is rebased onto
    /// the pooled mapping, so it keeps the same offset into the mapping it had in `src`.
    fn put_location(&mut self, input: &InputProfile, src: &Location) -> Result<u64, ProfileError> {
        let (mapping_id, delta) = match src.mapping_id {
            0 => (0, 0),
            id => {
                let mapping = input.mapping(id)?;
                self.put_mapping(input, mapping)?
            }
        };

        let mut lines = Vec::with_capacity(src.line.len());
        for line in &src.line {
            let function_id = match line.function_id {
                0 => 0,
                id => {
                    let function = input.function(id)?;
                    self.put_function(input, function)?
                }
            };
            lines.push((function_id, line.line));
        }

        // every frame with nothing to symbolize it shares one pooled entry
        let address = if mapping_id == 0 && lines.is_empty() {
            0
        } else {
            src.address.wrapping_add(delta)
        };

        let key = LocationKey::new(mapping_id, address, &lines, src.is_folded);
        Ok(self.locations.put(key, |id| Location {
            id,
            mapping_id,
            address,
            line: lines
                .iter()
                .map(|(function_id, line)| Line {
                    function_id: *function_id,
                    line: *line,
                })
                .collect(),
            is_folded: src.is_folded,
        }))
    }
}

/// Merges `profiles` in order into one artifact using a fresh merge session.
pub fn merge(profiles: &[Profile], config: &Config) -> Result<MergedProfile, ProfileError> {
    ProfileMerger::new(config).merge(profiles)
}
