/*
 * Message types for profpack's merged artifacts and for goroutine stack dumps.
 *
 * MergedProfile reuses the pprof Sample/Mapping/Location/Function messages for its pooled
 * entries and adds the per-input count arrays that let one input be sliced back out. Ids inside
 * pooled entries refer to the merged pools and the merged string table, not to any input.
 */
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MergedProfile {
    /// Concatenated (type, unit) string ids of every input's sample types.
    #[prost(int64, repeated, tag="1")]
    pub sample_type: ::prost::alloc::vec::Vec<i64>,
    /// Concatenated samples of every input. Location ids point into `locations`.
    /// Labels are kept in `labels`, never on the samples themselves.
    #[prost(message, repeated, tag="2")]
    pub samples: ::prost::alloc::vec::Vec<super::pprofs::Sample>,
    #[prost(message, repeated, tag="3")]
    pub mappings: ::prost::alloc::vec::Vec<super::pprofs::Mapping>,
    #[prost(message, repeated, tag="4")]
    pub locations: ::prost::alloc::vec::Vec<super::pprofs::Location>,
    #[prost(message, repeated, tag="5")]
    pub functions: ::prost::alloc::vec::Vec<super::pprofs::Function>,
    /// string_table\[0\] is always "".
    #[prost(string, repeated, tag="6")]
    pub string_table: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// Number of samples contributed by each input.
    #[prost(uint64, repeated, tag="7")]
    pub num_samples: ::prost::alloc::vec::Vec<u64>,
    /// Number of sample types contributed by each input.
    #[prost(uint64, repeated, tag="8")]
    pub num_sample_types: ::prost::alloc::vec::Vec<u64>,
    /// Number of functions, locations and mappings each input declared. Informational only.
    #[prost(uint64, repeated, tag="9")]
    pub num_functions: ::prost::alloc::vec::Vec<u64>,
    #[prost(uint64, repeated, tag="10")]
    pub num_locations: ::prost::alloc::vec::Vec<u64>,
    #[prost(uint64, repeated, tag="11")]
    pub num_mappings: ::prost::alloc::vec::Vec<u64>,
    #[prost(int64, repeated, tag="12")]
    pub periods: ::prost::alloc::vec::Vec<i64>,
    /// (type, unit) string id pair per input.
    #[prost(int64, repeated, tag="13")]
    pub period_types: ::prost::alloc::vec::Vec<i64>,
    #[prost(int64, repeated, tag="14")]
    pub durations_nanos: ::prost::alloc::vec::Vec<i64>,
    #[prost(int64, repeated, tag="15")]
    pub times_nanos: ::prost::alloc::vec::Vec<i64>,
    /// Labels keyed by absolute index into `samples`. Only labelled samples have an entry.
    #[prost(btree_map="uint64, message", tag="16")]
    pub labels: ::prost::alloc::collections::BTreeMap<u64, LabelSet>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LabelSet {
    /// String ids point into MergedProfile.string_table.
    #[prost(message, repeated, tag="1")]
    pub label: ::prost::alloc::vec::Vec<super::pprofs::Label>,
}
/// One goroutine stack dump, as parsed from the `debug=1` text format.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StackDump {
    /// Total number of goroutines.
    #[prost(uint64, tag="1")]
    pub total: u64,
    #[prost(message, repeated, tag="2")]
    pub stack_traces: ::prost::alloc::vec::Vec<StackTrace>,
    /// string_table\[0\] is always "".
    #[prost(string, repeated, tag="3")]
    pub string_table: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StackTrace {
    /// Number of goroutines sharing this stack.
    #[prost(uint64, tag="1")]
    pub total: u64,
    /// Raw program counters, innermost first.
    #[prost(uint64, repeated, tag="2")]
    pub pc: ::prost::alloc::vec::Vec<u64>,
    /// Symbolized frames, innermost first. Empty when the dump had no frame lines.
    #[prost(message, repeated, tag="3")]
    pub frames: ::prost::alloc::vec::Vec<Frame>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Frame {
    #[prost(uint64, tag="1")]
    pub address: u64,
    /// Index into string table.
    #[prost(uint64, tag="2")]
    pub function_name: u64,
    /// Offset of `address` from the start of the function.
    #[prost(uint64, tag="3")]
    pub offset: u64,
    /// Index into string table.
    #[prost(uint64, tag="4")]
    pub filename: u64,
    #[prost(uint64, tag="5")]
    pub line: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MergedStackDump {
    /// Total goroutine count of each input.
    #[prost(uint64, repeated, tag="1")]
    pub totals: ::prost::alloc::vec::Vec<u64>,
    /// Number of stack traces contributed by each input.
    #[prost(uint64, repeated, tag="2")]
    pub num_stack_traces: ::prost::alloc::vec::Vec<u64>,
    /// Concatenated stack traces. Frame string ids point into `string_table`.
    #[prost(message, repeated, tag="3")]
    pub stack_traces: ::prost::alloc::vec::Vec<StackTrace>,
    #[prost(string, repeated, tag="4")]
    pub string_table: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
/// Opaque profiles stored side by side without interpretation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MergedBlobs {
    #[prost(bytes="vec", repeated, tag="1")]
    pub profiles: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}
