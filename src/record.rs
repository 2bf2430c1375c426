//! Text rendering of a single intercepted call.
//!
//! ```text
//! [DEBUG-AGENT] Method 'addOp' was called!
//!  runtimeClass=com.example.PlayerList
//! ---- method params ----
//!  param0= Steve
//!  param1= [1, 2, 3]
//! ---- captured stack ----
//!  com.example.PlayerList.addOp(PlayerList.java:42)
//!  com.example.Main.main(Main.java:7)
//! ```
//!
//! Values follow `java.util.Arrays.deepToString` so the output reads the same
//! as it would from Java code.

use std::fmt::{self, Write as _};

/// Placeholder for an argument whose `toString()` threw.
pub const TO_STRING_FAILED: &str = "<toString() failed>";

/// The receiver's class as reported in the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverType {
    /// Runtime class of the receiver of an instance call.
    Runtime(String),
    /// Static call: the declaring class of the patched method.
    Resolved(String),
    /// Static call whose class could not be resolved.
    Unavailable,
}

impl ReceiverType {
    /// Receiver of a static call: the declaring class of the innermost
    /// captured frame, provided that frame is the reported method of a class
    /// with the reported simple name.
    pub fn for_static_call(simple_name: &str, method_name: &str, stack: &[StackFrame]) -> Self {
        match stack.first() {
            Some(frame)
                if frame.method_name == method_name
                    && frame.class_name.rsplit('.').next() == Some(simple_name) =>
            {
                ReceiverType::Resolved(frame.class_name.clone())
            }
            _ => ReceiverType::Unavailable,
        }
    }
}

/// A captured argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    /// Result of `String.valueOf` on a non-array object (boxed primitives
    /// included).
    Scalar(String),
    Booleans(Vec<bool>),
    Bytes(Vec<i8>),
    /// UTF-16 code units.
    Chars(Vec<u16>),
    Shorts(Vec<i16>),
    Ints(Vec<i32>),
    Longs(Vec<i64>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
    Objects(Vec<ArgValue>),
    /// An object array that contains itself, directly or through nesting.
    Cycle,
    /// An object array nested deeper than the capture limit; not expanded.
    TooDeep,
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Null => f.write_str("null"),
            ArgValue::Scalar(s) => f.write_str(s),
            ArgValue::Booleans(v) => write_list(f, v.iter()),
            ArgValue::Bytes(v) => write_list(f, v.iter()),
            ArgValue::Chars(v) => {
                let chars: Vec<char> = v
                    .iter()
                    .map(|&u| char::from_u32(u as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect();
                write_list(f, chars.iter())
            }
            ArgValue::Shorts(v) => write_list(f, v.iter()),
            ArgValue::Ints(v) => write_list(f, v.iter()),
            ArgValue::Longs(v) => write_list(f, v.iter()),
            ArgValue::Floats(v) => write_list(f, v.iter().map(|&x| JavaFloat(x as f64, true))),
            ArgValue::Doubles(v) => write_list(f, v.iter().map(|&x| JavaFloat(x, false))),
            ArgValue::Objects(v) => write_list(f, v.iter()),
            ArgValue::Cycle | ArgValue::TooDeep => f.write_str("[...]"),
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = T>) -> fmt::Result {
    f.write_char('[')?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_char(']')
}

/// `Float.toString` / `Double.toString` formatting. The flag marks a value
/// that came from a `float` so its shortest digits are computed at `f32`
/// precision.
struct JavaFloat(f64, bool);

impl fmt::Display for JavaFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let JavaFloat(v, single) = *self;
        if single {
            f.write_str(&java_float(v as f32))
        } else {
            f.write_str(&java_double(v))
        }
    }
}

/// Renders a `double` the way `Double.toString` does: `1.0`, `-0.0`,
/// `1.0E10`, `1.0E-5`, `NaN`, `Infinity`.
pub fn java_double(v: f64) -> String {
    java_decimal(v, format!("{}", v), format!("{:e}", v))
}

/// Renders a `float` the way `Float.toString` does.
pub fn java_float(v: f32) -> String {
    java_decimal(v as f64, format!("{}", v), format!("{:e}", v))
}

fn java_decimal(v: f64, plain: String, sci: String) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let magnitude = v.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        return if plain.contains('.') { plain } else { plain + ".0" };
    }
    // `{:e}` gives `1e10` or `1.5e-5`
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    if mantissa.contains('.') {
        format!("{}E{}", mantissa, exponent)
    } else {
        format!("{}.0E{}", mantissa, exponent)
    }
}

/// One frame of the captured stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Binary name of the declaring class, e.g. `com.example.Foo$Bar`.
    pub class_name: String,
    pub method_name: String,
    pub source_file: Option<String>,
    pub line: Option<u32>,
    pub native: bool,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.class_name, self.method_name)?;
        if self.native {
            f.write_str("Native Method")?;
        } else {
            match (&self.source_file, self.line) {
                (Some(file), Some(line)) => write!(f, "{}:{}", file, line)?,
                (Some(file), None) => f.write_str(file)?,
                (None, _) => f.write_str("Unknown Source")?,
            }
        }
        f.write_char(')')
    }
}

/// Everything known about one call of an instrumented method.
#[derive(Debug, Clone, PartialEq)]
pub struct CallEvent {
    pub method_name: String,
    pub receiver: ReceiverType,
    pub args: Vec<ArgValue>,
    /// Innermost frame first.
    pub stack: Vec<StackFrame>,
}

impl CallEvent {
    /// Renders the record. Every line, the last included, ends in `\n`.
    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[DEBUG-AGENT] Method '{}' was called!", self.method_name)?;
        match &self.receiver {
            ReceiverType::Runtime(name) => writeln!(f, " runtimeClass={}", name)?,
            ReceiverType::Resolved(name) => writeln!(f, " runtimeClass={} (forName)", name)?,
            ReceiverType::Unavailable => writeln!(f, " runtimeClass=N/A")?,
        }

        writeln!(f, "---- method params ----")?;
        if self.args.is_empty() {
            writeln!(f, "N/A")?;
        }
        for (i, arg) in self.args.iter().enumerate() {
            writeln!(f, " param{}= {}", i, arg)?;
        }

        writeln!(f, "---- captured stack ----")?;
        for frame in &self.stack {
            writeln!(f, " {}", frame)?;
        }
        Ok(())
    }
}
