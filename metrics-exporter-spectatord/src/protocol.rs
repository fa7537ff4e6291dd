//! The spectatord line protocol.
//!
//! Every datagram carries exactly one measurement:
//!
//! ```text
//! <type>:<name>,<tag1>=<value1>,<tag2>=<value2>:<value>
//! ```
//!
//! The colon separates fields, so any colon found in the name, a tag key, or a tag value is replaced with an
//! underscore. Tags are written in ascending key order, and the tag section is omitted entirely when there are no
//! tags. Floating-point values are written in their shortest round-trippable form.
use metrics_record::Tags;

const FIELD_SEPARATOR: char = ':';
const REPLACEMENT: char = '_';

/// Measurement types understood by spectatord.
///
/// Summaries and distributions have no type of their own: they are decomposed into several gauges or counters before
/// being written.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricType {
    /// A monotonic counter.
    Counter,

    /// A gauge.
    Gauge,
}

impl MetricType {
    /// Returns the symbol used on the wire for this type.
    pub const fn symbol(self) -> &'static str {
        match self {
            MetricType::Counter => "C",
            MetricType::Gauge => "g",
        }
    }
}

/// A measurement value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// An integer, such as a bucket count.
    Integer(i64),

    /// A floating-point value.
    FloatingPoint(f64),
}

struct MetricValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl MetricValueFormatter {
    fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    fn format(&mut self, value: MetricValue) -> &str {
        match value {
            MetricValue::Integer(v) => self.int_writer.format(v),
            MetricValue::FloatingPoint(v) => self.float_writer.format(v),
        }
    }
}

/// Formats a floating-point number for use as a tag value, such as a percentile or a bucket bound.
pub fn format_float(value: f64) -> String {
    ryu::Buffer::new().format(value).to_string()
}

/// Builds datagrams, reusing a single buffer between them.
///
/// An adapter expanding a summary or distribution into several datagrams keeps one writer for the whole record.
pub struct DatagramWriter {
    buf: String,
    formatter: MetricValueFormatter,
}

impl DatagramWriter {
    /// Creates a new `DatagramWriter`.
    pub fn new() -> Self {
        Self { buf: String::new(), formatter: MetricValueFormatter::new() }
    }

    /// Encodes a single datagram, returning a view of it that stays valid until the next write.
    pub fn write(&mut self, metric_type: MetricType, name: &str, tags: &Tags, value: MetricValue) -> &str {
        self.buf.clear();

        self.buf.push_str(metric_type.symbol());
        self.buf.push(FIELD_SEPARATOR);
        push_sanitized(&mut self.buf, name);

        for (key, tag_value) in tags {
            self.buf.push(',');
            push_sanitized(&mut self.buf, key);
            self.buf.push('=');
            push_sanitized(&mut self.buf, tag_value);
        }

        self.buf.push(FIELD_SEPARATOR);
        self.buf.push_str(self.formatter.format(value));

        &self.buf
    }
}

impl Default for DatagramWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a single datagram.
pub fn encode(metric_type: MetricType, name: &str, tags: &Tags, value: MetricValue) -> String {
    DatagramWriter::new().write(metric_type, name, tags, value).to_string()
}

fn push_sanitized(buf: &mut String, s: &str) {
    buf.extend(s.chars().map(|c| if c == FIELD_SEPARATOR { REPLACEMENT } else { c }));
}
