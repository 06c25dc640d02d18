//! The codec shell around merged artifacts: protobuf encoding, optional gzip, and validated
//! decoding of untrusted bytes.

use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;

use crate::blob;
use crate::core::config::Config;
use crate::core::types::{ProfileError, ProfileKind};
use crate::proto::pprofs::Profile;
use crate::proto::profpack::{MergedBlobs, MergedProfile, MergedStackDump, StackDump};
use crate::sampled;
use crate::stackdump;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Inflates `raw` if it starts with the gzip magic, otherwise returns it untouched.
pub fn gunzip_if_compressed(raw: &[u8]) -> Result<Cow<'_, [u8]>, ProfileError> {
    if !raw.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(raw));
    }
    let mut bytes = Vec::new();
    GzDecoder::new(raw)
        .read_to_end(&mut bytes)
        .map_err(ProfileError::DecompressFailure)?;
    Ok(Cow::Owned(bytes))
}

pub fn gzip(bytes: &[u8], level: u32) -> Result<Vec<u8>, ProfileError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// A merged artifact that can be encoded, decoded and sliced back into its inputs.
pub trait Artifact: Message + Default + Sized {
    /// What unpacking one input yields.
    type Output;

    const KIND: ProfileKind;

    fn num_inputs(&self) -> usize;

    /// Checks that every per-input array and every id in the artifact is consistent, so that
    /// unpacking a decoded artifact cannot index out of bounds.
    fn validate(&self) -> Result<(), ProfileError>;

    fn unpack(&self, index: usize) -> Result<Self::Output, ProfileError>;

    fn write_uncompressed<W: Write>(&self, w: &mut W) -> Result<(), ProfileError> {
        w.write_all(&self.encode_to_vec())?;
        Ok(())
    }

    fn write_compressed<W: Write>(&self, w: &mut W, level: u32) -> Result<(), ProfileError> {
        let mut encoder = GzEncoder::new(w, Compression::new(level.min(9)));
        encoder.write_all(&self.encode_to_vec())?;
        encoder.finish()?;
        Ok(())
    }

    /// Decodes and validates an artifact written by `write_compressed` or `write_uncompressed`.
    fn decode_artifact(raw: &[u8]) -> Result<Self, ProfileError> {
        let bytes = gunzip_if_compressed(raw)?;
        let artifact = Self::decode(bytes.as_ref())?;
        artifact.validate()?;
        Ok(artifact)
    }

    fn unpack_raw(raw: &[u8], index: usize) -> Result<Self::Output, ProfileError> {
        Self::decode_artifact(raw)?.unpack(index)
    }
}

fn check_len(array: &str, len: usize, expected: usize) -> Result<(), ProfileError> {
    if len != expected {
        return Err(ProfileError::decode(format!(
            "{} has {} entries, expected {}",
            array, len, expected
        )));
    }
    Ok(())
}

fn check_sum(
    array: &str,
    counts: &[u64],
    stride: u64,
    expected: usize,
) -> Result<(), ProfileError> {
    let total = counts
        .iter()
        .try_fold(0u64, |acc, n| n.checked_mul(stride).and_then(|n| acc.checked_add(n)));
    if total != Some(expected as u64) {
        return Err(ProfileError::decode(format!(
            "{} does not add up to the {} entries it describes",
            array, expected
        )));
    }
    Ok(())
}

fn check_string<I>(ids: I, table_len: usize) -> Result<(), ProfileError>
where
    I: IntoIterator<Item = i64>,
{
    for id in ids {
        if id < 0 || id as u64 >= table_len as u64 {
            return Err(ProfileError::decode(format!(
                "string id {} is outside the string table (len {})",
                id, table_len
            )));
        }
    }
    Ok(())
}

fn check_ref(kind: &str, id: u64, len: usize, optional: bool) -> Result<(), ProfileError> {
    if (id == 0 && optional) || (id >= 1 && id <= len as u64) {
        return Ok(());
    }
    Err(ProfileError::decode(format!("{} id {} is not pooled", kind, id)))
}

fn check_string_table(table: &[String]) -> Result<(), ProfileError> {
    match table.first() {
        Some(first) if !first.is_empty() => Err(ProfileError::decode(
            "string table does not start with the empty string",
        )),
        _ => Ok(()),
    }
}

impl Artifact for MergedProfile {
    type Output = Profile;
    const KIND: ProfileKind = ProfileKind::Sampled;

    fn num_inputs(&self) -> usize {
        self.num_samples.len()
    }

    fn validate(&self) -> Result<(), ProfileError> {
        let k = self.num_inputs();
        check_len("num_sample_types", self.num_sample_types.len(), k)?;
        check_len("num_functions", self.num_functions.len(), k)?;
        check_len("num_locations", self.num_locations.len(), k)?;
        check_len("num_mappings", self.num_mappings.len(), k)?;
        check_len("periods", self.periods.len(), k)?;
        check_len("period_types", self.period_types.len(), k * 2)?;
        check_len("durations_nanos", self.durations_nanos.len(), k)?;
        check_len("times_nanos", self.times_nanos.len(), k)?;
        check_sum("num_samples", &self.num_samples, 1, self.samples.len())?;
        check_sum("num_sample_types", &self.num_sample_types, 2, self.sample_type.len())?;

        check_string_table(&self.string_table)?;
        let strings = self.string_table.len();
        check_string(self.sample_type.iter().copied(), strings)?;
        check_string(self.period_types.iter().copied(), strings)?;
        for f in &self.functions {
            check_string([f.name, f.system_name, f.filename], strings)?;
        }
        for m in &self.mappings {
            check_string([m.filename, m.build_id], strings)?;
        }
        for l in &self.locations {
            check_ref("mapping", l.mapping_id, self.mappings.len(), true)?;
            for line in &l.line {
                check_ref("function", line.function_id, self.functions.len(), true)?;
            }
        }
        for s in &self.samples {
            for id in &s.location_id {
                check_ref("location", *id, self.locations.len(), false)?;
            }
        }
        for (position, set) in &self.labels {
            if *position >= self.samples.len() as u64 {
                return Err(ProfileError::decode(format!(
                    "labels attached to sample {} but there are only {} samples",
                    position,
                    self.samples.len()
                )));
            }
            for l in &set.label {
                check_string([l.key, l.str, l.num_unit], strings)?;
            }
        }
        Ok(())
    }

    fn unpack(&self, index: usize) -> Result<Profile, ProfileError> {
        sampled::unpack(self, index)
    }
}

impl Artifact for MergedStackDump {
    type Output = StackDump;
    const KIND: ProfileKind = ProfileKind::StackDump;

    fn num_inputs(&self) -> usize {
        self.num_stack_traces.len()
    }

    fn validate(&self) -> Result<(), ProfileError> {
        check_len("totals", self.totals.len(), self.num_inputs())?;
        check_sum("num_stack_traces", &self.num_stack_traces, 1, self.stack_traces.len())?;
        check_string_table(&self.string_table)?;
        let strings = self.string_table.len() as u64;
        for frame in self.stack_traces.iter().flat_map(|s| &s.frames) {
            if frame.function_name >= strings || frame.filename >= strings {
                return Err(ProfileError::decode(format!(
                    "frame at {:#x} references a string outside the string table (len {})",
                    frame.address, strings
                )));
            }
        }
        Ok(())
    }

    fn unpack(&self, index: usize) -> Result<StackDump, ProfileError> {
        stackdump::unpack(self, index)
    }
}

impl Artifact for MergedBlobs {
    type Output = Vec<u8>;
    const KIND: ProfileKind = ProfileKind::Opaque;

    fn num_inputs(&self) -> usize {
        self.profiles.len()
    }

    fn validate(&self) -> Result<(), ProfileError> {
        Ok(())
    }

    fn unpack(&self, index: usize) -> Result<Vec<u8>, ProfileError> {
        blob::unpack(self, index).map(<[u8]>::to_vec)
    }
}

/// A merged artifact of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Merged {
    Sampled(MergedProfile),
    StackDump(MergedStackDump),
    Opaque(MergedBlobs),
}

/// One input reconstructed from a `Merged`.
#[derive(Debug, Clone, PartialEq)]
pub enum Unpacked {
    Sampled(Profile),
    StackDump(StackDump),
    Opaque(Vec<u8>),
}

/// Machine-readable description of a merged artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub kind: ProfileKind,
    pub num_inputs: usize,
    pub inputs: Vec<InputSummary>,
    /// Sizes of the shared pools. Zero for kinds that do not pool that entity.
    pub functions: usize,
    pub locations: usize,
    pub mappings: usize,
    pub strings: usize,
    pub encoded_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSummary {
    pub index: usize,
    /// Samples, stack traces or bytes, depending on the kind.
    pub entries: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_types: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl Merged {
    /// Decodes raw captures of `kind` and merges them in order. Sampled inputs are pprof
    /// protobufs, stack dumps are `debug=1` text; either may be gzipped. Opaque inputs are
    /// stored as given.
    pub fn merge<B: AsRef<[u8]>>(
        kind: ProfileKind,
        inputs: &[B],
        config: &Config,
    ) -> Result<Merged, ProfileError> {
        Ok(match kind {
            ProfileKind::Sampled => {
                let profiles = inputs
                    .iter()
                    .map(|raw| sampled::decode_profile(raw.as_ref()))
                    .collect::<Result<Vec<_>, _>>()?;
                Merged::Sampled(sampled::merge(&profiles, config)?)
            }
            ProfileKind::StackDump => {
                let dumps = inputs
                    .iter()
                    .map(|raw| stackdump::parse_stack_dump(raw.as_ref()))
                    .collect::<Result<Vec<_>, _>>()?;
                Merged::StackDump(stackdump::merge(&dumps)?)
            }
            ProfileKind::Opaque => Merged::Opaque(blob::merge(inputs)),
        })
    }

    pub fn decode(kind: ProfileKind, raw: &[u8]) -> Result<Merged, ProfileError> {
        Ok(match kind {
            ProfileKind::Sampled => Merged::Sampled(MergedProfile::decode_artifact(raw)?),
            ProfileKind::StackDump => Merged::StackDump(MergedStackDump::decode_artifact(raw)?),
            ProfileKind::Opaque => Merged::Opaque(MergedBlobs::decode_artifact(raw)?),
        })
    }

    pub fn kind(&self) -> ProfileKind {
        match self {
            Merged::Sampled(_) => MergedProfile::KIND,
            Merged::StackDump(_) => MergedStackDump::KIND,
            Merged::Opaque(_) => MergedBlobs::KIND,
        }
    }

    pub fn num_inputs(&self) -> usize {
        match self {
            Merged::Sampled(m) => m.num_inputs(),
            Merged::StackDump(m) => m.num_inputs(),
            Merged::Opaque(m) => m.num_inputs(),
        }
    }

    pub fn unpack(&self, index: usize) -> Result<Unpacked, ProfileError> {
        Ok(match self {
            Merged::Sampled(m) => Unpacked::Sampled(m.unpack(index)?),
            Merged::StackDump(m) => Unpacked::StackDump(m.unpack(index)?),
            Merged::Opaque(m) => Unpacked::Opaque(m.unpack(index)?),
        })
    }

    pub fn write_uncompressed<W: Write>(&self, w: &mut W) -> Result<(), ProfileError> {
        match self {
            Merged::Sampled(m) => m.write_uncompressed(w),
            Merged::StackDump(m) => m.write_uncompressed(w),
            Merged::Opaque(m) => m.write_uncompressed(w),
        }
    }

    pub fn write_compressed<W: Write>(&self, w: &mut W, level: u32) -> Result<(), ProfileError> {
        match self {
            Merged::Sampled(m) => m.write_compressed(w, level),
            Merged::StackDump(m) => m.write_compressed(w, level),
            Merged::Opaque(m) => m.write_compressed(w, level),
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Merged::Sampled(m) => m.encoded_len(),
            Merged::StackDump(m) => m.encoded_len(),
            Merged::Opaque(m) => m.encoded_len(),
        }
    }

    pub fn summary(&self) -> ArtifactSummary {
        let mut summary = ArtifactSummary {
            kind: self.kind(),
            num_inputs: self.num_inputs(),
            inputs: Vec::with_capacity(self.num_inputs()),
            functions: 0,
            locations: 0,
            mappings: 0,
            strings: 0,
            encoded_bytes: self.encoded_len(),
        };
        match self {
            Merged::Sampled(m) => {
                summary.functions = m.functions.len();
                summary.locations = m.locations.len();
                summary.mappings = m.mappings.len();
                summary.strings = m.string_table.len();
                for (index, samples) in m.num_samples.iter().enumerate() {
                    summary.inputs.push(InputSummary {
                        index,
                        entries: *samples,
                        sample_types: m.num_sample_types.get(index).copied(),
                        total: None,
                    });
                }
            }
            Merged::StackDump(m) => {
                summary.strings = m.string_table.len();
                for (index, stacks) in m.num_stack_traces.iter().enumerate() {
                    summary.inputs.push(InputSummary {
                        index,
                        entries: *stacks,
                        sample_types: None,
                        total: m.totals.get(index).copied(),
                    });
                }
            }
            Merged::Opaque(m) => {
                for (index, profile) in m.profiles.iter().enumerate() {
                    summary.inputs.push(InputSummary {
                        index,
                        entries: profile.len() as u64,
                        sample_types: None,
                        total: None,
                    });
                }
            }
        }
        summary
    }
}

impl Unpacked {
    /// Writes the input in the format it was captured in: gzipped pprof for sampled profiles,
    /// `debug=1` text for stack dumps and the original bytes for opaque profiles.
    pub fn write<W: Write>(&self, w: &mut W, config: &Config) -> Result<(), ProfileError> {
        match self {
            Unpacked::Sampled(profile) => {
                let mut encoder = GzEncoder::new(w, config.compression());
                encoder.write_all(&profile.encode_to_vec())?;
                encoder.finish()?;
            }
            Unpacked::StackDump(dump) => stackdump::write_debug_text(dump, w)?,
            Unpacked::Opaque(bytes) => w.write_all(bytes)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::profpack::LabelSet;
    use crate::test_utils::sampled::{function, resolved, sample_batch, ProfileBuilder};
    use crate::test_utils::stackdump::{FIXTURES, GOROUTINE_1, GOROUTINE_3};
    use crate::test_utils::{gunzip, init_logging};

    fn merged_profile() -> (Vec<Profile>, MergedProfile) {
        let mut a = ProfileBuilder::new().sample_types(&[("samples", "count")]);
        a.labelled_stack(&[function("f", "f", "a.go", 10)], &[1], &[("state", "idle")], &[]);
        let a = a.build();
        let mut b = ProfileBuilder::new().sample_types(&[("samples", "count")]);
        b.stack(&[function("g", "g", "b.go", 20), function("f", "f", "a.go", 10)], &[2]);
        let b = b.build();
        let inputs = vec![a, b];
        let merged = sampled::merge(&inputs, &Config::default()).unwrap();
        (inputs, merged)
    }

    fn stack_dumps() -> Vec<StackDump> {
        FIXTURES.clone()
    }

    #[test]
    fn compressed_artifact_unpacks_by_index() {
        init_logging();
        let (inputs, merged) = merged_profile();
        let mut bytes = Vec::new();
        merged.write_compressed(&mut bytes, 6).unwrap();
        assert!(bytes.starts_with(&GZIP_MAGIC));
        assert_eq!(gunzip(&bytes), merged.encode_to_vec());

        for (index, input) in inputs.iter().enumerate() {
            let unpacked = MergedProfile::unpack_raw(&bytes, index).unwrap();
            assert_eq!(resolved(&unpacked), resolved(input));
        }
    }

    #[test]
    fn uncompressed_artifact_decodes_too() {
        let dumps = stack_dumps();
        let merged = stackdump::merge(&dumps).unwrap();
        let mut bytes = Vec::new();
        merged.write_uncompressed(&mut bytes).unwrap();
        assert_eq!(MergedStackDump::decode_artifact(&bytes).unwrap(), merged);
        assert_eq!(MergedStackDump::unpack_raw(&bytes, 2).unwrap(), dumps[2]);
    }

    #[test]
    fn unpack_raw_past_the_end_is_out_of_range() {
        let (_, merged) = merged_profile();
        let mut bytes = Vec::new();
        merged.write_compressed(&mut bytes, 1).unwrap();
        assert!(matches!(
            MergedProfile::unpack_raw(&bytes, 2),
            Err(ProfileError::IndexOutOfRange { index: 2, .. })
        ));

        let blobs = blob::merge(&[b"a", b"b"]);
        let mut bytes = Vec::new();
        blobs.write_compressed(&mut bytes, 6).unwrap();
        assert_eq!(MergedBlobs::unpack_raw(&bytes, 1).unwrap(), b"b".to_vec());
        assert!(matches!(
            MergedBlobs::unpack_raw(&bytes, 2),
            Err(ProfileError::IndexOutOfRange { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn corrupt_gzip_is_a_decompress_failure() {
        let (_, merged) = merged_profile();
        let mut bytes = Vec::new();
        merged.write_compressed(&mut bytes, 6).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(matches!(
            MergedProfile::decode_artifact(&bytes),
            Err(ProfileError::DecompressFailure(_))
        ));
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        assert!(matches!(
            MergedProfile::decode_artifact(&[0x0a, 0xff, 0xff, 0xff, 0xff, 0x0f]),
            Err(ProfileError::DecodeFailure(_))
        ));
    }

    fn assert_rejected(merged: &MergedProfile) {
        let bytes = merged.encode_to_vec();
        match MergedProfile::decode_artifact(&bytes) {
            Err(ProfileError::DecodeFailure(_)) => {}
            other => panic!("expected decode failure, got {:?}", other),
        }
    }

    #[test]
    fn validation_rejects_inconsistent_sampled_artifacts() {
        let (_, merged) = merged_profile();
        assert!(merged.validate().is_ok());

        let mut short_periods = merged.clone();
        short_periods.periods.pop();
        assert_rejected(&short_periods);

        let mut extra_sample = merged.clone();
        extra_sample.samples.push(extra_sample.samples[0].clone());
        assert_rejected(&extra_sample);

        let mut dangling_location = merged.clone();
        dangling_location.samples[1].location_id.push(9);
        assert_rejected(&dangling_location);

        let mut dangling_function = merged.clone();
        dangling_function.locations[0].line[0].function_id = 7;
        assert_rejected(&dangling_function);

        let mut bad_string = merged.clone();
        bad_string.functions[0].filename = 1000;
        assert_rejected(&bad_string);

        let mut bad_label = merged.clone();
        bad_label.labels.insert(5, LabelSet::default());
        assert_rejected(&bad_label);

        let mut bad_table = merged;
        bad_table.string_table[0] = "oops".to_string();
        assert_rejected(&bad_table);
    }

    #[test]
    fn validation_rejects_inconsistent_stack_dumps() {
        let merged = stackdump::merge(&stack_dumps()).unwrap();
        assert!(merged.validate().is_ok());

        let mut short_totals = merged.clone();
        short_totals.totals.pop();
        assert!(short_totals.validate().is_err());

        let mut miscounted = merged.clone();
        miscounted.num_stack_traces[1] -= 1;
        assert!(miscounted.validate().is_err());

        let mut bad_string = merged;
        bad_string.stack_traces[0].frames[0].filename = 10_000;
        assert!(bad_string.validate().is_err());
    }

    #[test]
    fn merged_sampled_batch_is_smaller_than_independent_gzips() {
        let inputs = sample_batch(4, 50, 300, 42);
        let independent: usize = inputs
            .iter()
            .map(|p| gzip(&p.encode_to_vec(), 6).unwrap().len())
            .sum();

        let merged = sampled::merge(&inputs, &Config::default()).unwrap();
        let mut bytes = Vec::new();
        merged.write_compressed(&mut bytes, 6).unwrap();
        assert!(
            bytes.len() < independent,
            "merged {} bytes, independent {} bytes",
            bytes.len(),
            independent
        );
    }

    #[test]
    fn merged_stack_dumps_are_smaller_than_independent_gzips() {
        let dumps = stack_dumps();
        let independent: usize = dumps
            .iter()
            .map(|d| gzip(&d.encode_to_vec(), 6).unwrap().len())
            .sum();

        let merged = stackdump::merge(&dumps).unwrap();
        let mut bytes = Vec::new();
        merged.write_compressed(&mut bytes, 6).unwrap();
        assert!(bytes.len() < independent);
    }

    #[test]
    fn merged_enum_dispatches_on_kind() {
        let raw: Vec<Vec<u8>> = vec![GOROUTINE_1.into(), GOROUTINE_3.into()];
        let merged = Merged::merge(ProfileKind::StackDump, &raw, &Config::default()).unwrap();
        assert_eq!(merged.kind(), ProfileKind::StackDump);
        assert_eq!(merged.num_inputs(), 2);

        let mut bytes = Vec::new();
        merged.write_compressed(&mut bytes, 6).unwrap();
        let decoded = Merged::decode(ProfileKind::StackDump, &bytes).unwrap();
        assert_eq!(decoded, merged);

        let mut text = Vec::new();
        decoded.unpack(1).unwrap().write(&mut text, &Config::default()).unwrap();
        let reparsed = stackdump::parse(std::str::from_utf8(&text).unwrap()).unwrap();
        assert_eq!(reparsed, stack_dumps()[2]);
    }

    #[test]
    fn unpacked_sampled_profile_is_written_as_gzipped_pprof() {
        let (inputs, merged) = merged_profile();
        let merged = Merged::Sampled(merged);
        let mut bytes = Vec::new();
        merged.unpack(1).unwrap().write(&mut bytes, &Config::default()).unwrap();
        let profile = sampled::decode_profile(&bytes).unwrap();
        assert_eq!(resolved(&profile), resolved(&inputs[1]));
    }

    #[test]
    fn summary_describes_the_artifact() {
        let (_, merged) = merged_profile();
        let summary = Merged::Sampled(merged).summary();
        assert_eq!(summary.kind, ProfileKind::Sampled);
        assert_eq!(summary.num_inputs, 2);
        assert_eq!(summary.functions, 2);
        assert_eq!(summary.inputs[1].entries, 1);
        assert_eq!(summary.inputs[1].sample_types, Some(1));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["kind"], "sampled");
        assert!(json["inputs"][0].get("total").is_none());

        let merged = stackdump::merge(&stack_dumps()).unwrap();
        let summary = Merged::StackDump(merged).summary();
        assert_eq!(summary.inputs[0].total, Some(5));
        assert_eq!(summary.inputs[2].entries, 2);
    }
}
