// Fixtures and helpers shared by the unit tests.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn gunzip(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out).unwrap();
    out
}

pub mod stackdump {
    use crate::proto::profpack::StackDump;

    pub const GOROUTINE_1: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/ci/testdata/goroutine-1.txt"));
    pub const GOROUTINE_2: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/ci/testdata/goroutine-2.txt"));
    pub const GOROUTINE_3: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/ci/testdata/goroutine-3.txt"));

    lazy_static! {
        pub static ref FIXTURES: Vec<StackDump> = [GOROUTINE_1, GOROUTINE_2, GOROUTINE_3]
            .iter()
            .map(|text| crate::stackdump::parse(text).unwrap())
            .collect();
    }
}

pub mod sampled {
    use std::collections::HashMap;

    use rand::distr::Alphanumeric;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::core::strings::StringInterner;
    use crate::proto::pprofs::{
        Function, Label, Line, Location, Mapping, Profile, Sample, ValueType,
    };

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct FunctionSpec {
        pub name: String,
        pub system_name: String,
        pub filename: String,
        pub start_line: i64,
    }

    pub fn function(
        name: &str,
        system_name: &str,
        filename: &str,
        start_line: i64,
    ) -> FunctionSpec {
        FunctionSpec {
            name: name.to_string(),
            system_name: system_name.to_string(),
            filename: filename.to_string(),
            start_line,
        }
    }

    /// Builds pprof profiles with profile-local ids the way a profiler would emit them.
    pub struct ProfileBuilder {
        strings: StringInterner,
        profile: Profile,
        functions: HashMap<FunctionSpec, u64>,
        // function id -> id of the single-line, unmapped location calling it
        frames: HashMap<u64, u64>,
    }

    impl ProfileBuilder {
        pub fn new() -> ProfileBuilder {
            ProfileBuilder {
                strings: StringInterner::new(),
                profile: Profile::default(),
                functions: HashMap::new(),
                frames: HashMap::new(),
            }
        }

        fn string(&mut self, value: &str) -> i64 {
            self.strings.intern(value) as i64
        }

        pub fn sample_types(mut self, types: &[(&str, &str)]) -> Self {
            for (r#type, unit) in types {
                let vt = ValueType {
                    r#type: self.string(r#type),
                    unit: self.string(unit),
                };
                self.profile.sample_type.push(vt);
            }
            self
        }

        pub fn time(mut self, time_nanos: i64) -> Self {
            self.profile.time_nanos = time_nanos;
            self
        }

        pub fn duration(mut self, duration_nanos: i64) -> Self {
            self.profile.duration_nanos = duration_nanos;
            self
        }

        pub fn period(&mut self, r#type: &str, unit: &str, period: i64) {
            self.profile.period_type = Some(ValueType {
                r#type: self.string(r#type),
                unit: self.string(unit),
            });
            self.profile.period = period;
        }

        fn function_id(&mut self, spec: &FunctionSpec) -> u64 {
            if let Some(id) = self.functions.get(spec) {
                return *id;
            }
            let id = self.profile.function.len() as u64 + 1;
            let function = Function {
                id,
                name: self.string(&spec.name),
                system_name: self.string(&spec.system_name),
                filename: self.string(&spec.filename),
                start_line: spec.start_line,
            };
            self.profile.function.push(function);
            self.functions.insert(spec.clone(), id);
            id
        }

        fn push_location(&mut self, mapping_id: u64, address: u64, line: Vec<Line>) -> u64 {
            let id = self.profile.location.len() as u64 + 1;
            self.profile.location.push(Location {
                id,
                mapping_id,
                address,
                line,
                is_folded: false,
            });
            id
        }

        fn frame(&mut self, spec: &FunctionSpec) -> u64 {
            let function_id = self.function_id(spec);
            if let Some(id) = self.frames.get(&function_id) {
                return *id;
            }
            let line = vec![Line {
                function_id,
                line: spec.start_line + 1,
            }];
            let id = self.push_location(0, 0, line);
            self.frames.insert(function_id, id);
            id
        }

        /// Adds a sample whose stack is `frames`, innermost first, one location per function.
        pub fn stack(&mut self, frames: &[FunctionSpec], values: &[i64]) {
            self.labelled_stack(frames, values, &[], &[]);
        }

        pub fn labelled_stack(
            &mut self,
            frames: &[FunctionSpec],
            values: &[i64],
            string_labels: &[(&str, &str)],
            numeric_labels: &[(&str, i64, &str)],
        ) {
            let location_id = frames.iter().map(|f| self.frame(f)).collect();
            let mut label = Vec::new();
            for (key, value) in string_labels {
                label.push(Label {
                    key: self.string(key),
                    str: self.string(value),
                    ..Label::default()
                });
            }
            for (key, num, unit) in numeric_labels {
                label.push(Label {
                    key: self.string(key),
                    num: *num,
                    num_unit: self.string(unit),
                    ..Label::default()
                });
            }
            self.profile.sample.push(Sample {
                location_id,
                value: values.to_vec(),
                label,
            });
        }

        pub fn mapping(
            &mut self,
            start: u64,
            limit: u64,
            offset: u64,
            filename: &str,
            build_id: &str,
        ) -> u64 {
            let id = self.profile.mapping.len() as u64 + 1;
            let mapping = Mapping {
                id,
                memory_start: start,
                memory_limit: limit,
                file_offset: offset,
                filename: self.string(filename),
                build_id: self.string(build_id),
                has_functions: true,
                has_filenames: true,
                has_line_numbers: true,
                has_inline_frames: false,
            };
            self.profile.mapping.push(mapping);
            id
        }

        /// A mapped location whose lines are `frames`, innermost inlined function first.
        pub fn mapped_location(
            &mut self,
            mapping_id: u64,
            address: u64,
            frames: &[FunctionSpec],
        ) -> u64 {
            let line = frames
                .iter()
                .map(|f| Line {
                    function_id: self.function_id(f),
                    line: f.start_line + 2,
                })
                .collect();
            self.push_location(mapping_id, address, line)
        }

        /// A location with neither a mapping nor lines.
        pub fn bare_location(&mut self, address: u64) -> u64 {
            self.push_location(0, address, Vec::new())
        }

        pub fn raw_sample(&mut self, location_id: &[u64], values: &[i64]) {
            self.profile.sample.push(Sample {
                location_id: location_id.to_vec(),
                value: values.to_vec(),
                label: Vec::new(),
            });
        }

        pub fn build(mut self) -> Profile {
            self.profile.string_table = self.strings.into_table();
            self.profile
        }
    }

    /// `num_inputs` heap profiles whose stacks are drawn from one shared set of
    /// `num_functions` functions, like repeated captures of the same service.
    pub fn sample_batch(
        num_inputs: usize,
        samples_per_input: usize,
        num_functions: usize,
        seed: u64,
    ) -> Vec<Profile> {
        let mut rng = StdRng::seed_from_u64(seed);
        let ident = |rng: &mut StdRng, len: usize| -> String {
            (0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
        };
        let files: Vec<String> = (0..20)
            .map(|_| format!("/src/{}/{}.go", ident(&mut rng, 8), ident(&mut rng, 10)))
            .collect();
        let functions: Vec<FunctionSpec> = (0..num_functions)
            .map(|i| {
                let name = format!("pkg{}.{}", i % 17, ident(&mut rng, 16));
                let file = &files[rng.random_range(0..files.len())];
                function(&name, &name, file, rng.random_range(1..2000))
            })
            .collect();

        (0..num_inputs)
            .map(|i| {
                let mut builder = ProfileBuilder::new()
                    .sample_types(&[("alloc_objects", "count"), ("alloc_space", "bytes")])
                    .time(1_700_000_000_000_000_000 + i as i64 * 10_000_000_000)
                    .duration(10_000_000_000);
                builder.period("space", "bytes", 524_288);
                for _ in 0..samples_per_input {
                    let depth = rng.random_range(3..10);
                    let stack: Vec<FunctionSpec> = (0..depth)
                        .map(|_| functions[rng.random_range(0..functions.len())].clone())
                        .collect();
                    let values: [i64; 2] = [rng.random_range(1..100), rng.random_range(1..1 << 20)];
                    if rng.random_range(0..4) == 0 {
                        let worker = format!("{}", rng.random_range(0..8));
                        let labels = [("worker", worker.as_str())];
                        builder.labelled_stack(&stack, &values, &labels, &[]);
                    } else {
                        builder.stack(&stack, &values);
                    }
                }
                builder.build()
            })
            .collect()
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct ResolvedFunction {
        pub name: String,
        pub system_name: String,
        pub filename: String,
        pub start_line: i64,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct ResolvedMapping {
        pub memory_start: u64,
        pub memory_limit: u64,
        pub file_offset: u64,
        pub filename: String,
        pub build_id: String,
        pub flags: [bool; 4],
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct ResolvedLocation {
        pub address: u64,
        pub mapping: Option<ResolvedMapping>,
        pub lines: Vec<(Option<ResolvedFunction>, i64)>,
        pub is_folded: bool,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct ResolvedSample {
        pub stack: Vec<ResolvedLocation>,
        pub values: Vec<i64>,
        /// (key, string value, number, unit)
        pub labels: Vec<(String, String, i64, String)>,
    }

    /// The content of a profile with every id replaced by what it refers to.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ResolvedProfile {
        pub sample_types: Vec<(String, String)>,
        pub samples: Vec<ResolvedSample>,
        pub period_type: Option<(String, String)>,
        pub period: i64,
        pub duration_nanos: i64,
        pub time_nanos: i64,
    }

    pub fn resolved(profile: &Profile) -> ResolvedProfile {
        let s = |id: i64| profile.string_table[id as usize].clone();
        let function = |id: u64| {
            profile.function.iter().find(|f| f.id == id).map(|f| ResolvedFunction {
                name: s(f.name),
                system_name: s(f.system_name),
                filename: s(f.filename),
                start_line: f.start_line,
            })
        };
        let mapping = |id: u64| {
            profile.mapping.iter().find(|m| m.id == id).map(|m| ResolvedMapping {
                memory_start: m.memory_start,
                memory_limit: m.memory_limit,
                file_offset: m.file_offset,
                filename: s(m.filename),
                build_id: s(m.build_id),
                flags: [m.has_functions, m.has_filenames, m.has_line_numbers, m.has_inline_frames],
            })
        };
        let location = |id: u64| {
            let l = profile.location.iter().find(|l| l.id == id).unwrap();
            ResolvedLocation {
                address: l.address,
                mapping: mapping(l.mapping_id),
                lines: l.line.iter().map(|line| (function(line.function_id), line.line)).collect(),
                is_folded: l.is_folded,
            }
        };

        ResolvedProfile {
            sample_types: profile.sample_type.iter().map(|vt| (s(vt.r#type), s(vt.unit))).collect(),
            samples: profile
                .sample
                .iter()
                .map(|sample| ResolvedSample {
                    stack: sample.location_id.iter().map(|id| location(*id)).collect(),
                    values: sample.value.clone(),
                    labels: sample
                        .label
                        .iter()
                        .map(|l| (s(l.key), s(l.str), l.num, s(l.num_unit)))
                        .collect(),
                })
                .collect(),
            period_type: profile
                .period_type
                .as_ref()
                .map(|vt| (s(vt.r#type), s(vt.unit)))
                .filter(|(t, u)| !(t.is_empty() && u.is_empty())),
            period: profile.period,
            duration_nanos: profile.duration_nanos,
            time_nanos: profile.time_nanos,
        }
    }
}
