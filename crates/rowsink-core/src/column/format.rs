//! Printf-style rendering of single column values.
//!
//! Column format descriptors use the classic `%` template syntax so that
//! declarations read the way they do in most tabulation tools: `"%d"`,
//! `"%.3f"`, `"%08x"`, `"%s"`. A template may contain literal text around
//! the conversion; every conversion in the template receives the same value.
//!
//! Supported conversions: `d`/`i` (signed), `u` (unsigned), `x`/`X` (hex),
//! `o` (octal), `f`/`F` (fixed point, default precision 6), `e`/`E`
//! (scientific), `g`/`G` (general form; the precision counts significant
//! digits), `s` (string), `%%` (literal percent).
//! Flags `-` and `0`, a decimal width, and a `.precision` are honored; the C
//! length modifiers (`h`, `l`, `ll`, `z`, `j`, `t`) are accepted and ignored.

use snafu::prelude::*;

use crate::column::Scalar;

/// Errors raised while interpreting a format template.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum FormatError {
    /// The template ended in the middle of a `%` conversion.
    #[snafu(display("format template ends inside a conversion"))]
    Truncated,

    /// The conversion character is not one this renderer understands.
    #[snafu(display("unknown conversion %{conversion} in format template"))]
    UnknownConversion {
        /// The offending conversion character.
        conversion: char,
    },

    /// A numeric conversion was applied to a textual value.
    #[snafu(display("numeric conversion %{conversion} applied to a string value"))]
    NumericOnText {
        /// The offending conversion character.
        conversion: char,
    },
}

/// The value being substituted into a template.
pub enum FormatArg<'a> {
    /// An arithmetic cell value.
    Scalar(Scalar),
    /// A textual cell value.
    Text(&'a str),
}

#[derive(Default)]
struct Spec {
    left: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// Render `arg` through the printf-style `template`.
pub fn render(template: &str, arg: &FormatArg<'_>) -> Result<String, FormatError> {
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut spec = Spec::default();
        // flags
        while let Some(&f) = chars.peek() {
            match f {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                '+' | ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        // width
        let mut width = None;
        while let Some(&d) = chars.peek() {
            if let Some(v) = d.to_digit(10) {
                width = Some(width.unwrap_or(0) * 10 + v as usize);
                chars.next();
            } else {
                break;
            }
        }
        spec.width = width;
        // precision
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut prec = 0usize;
            while let Some(&d) = chars.peek() {
                if let Some(v) = d.to_digit(10) {
                    prec = prec * 10 + v as usize;
                    chars.next();
                } else {
                    break;
                }
            }
            spec.precision = Some(prec);
        }
        // length modifiers, ignored
        while let Some(&m) = chars.peek() {
            if matches!(m, 'h' | 'l' | 'z' | 'j' | 't') {
                chars.next();
            } else {
                break;
            }
        }

        let conv = chars.next().context(TruncatedSnafu)?;
        out.push_str(&render_one(conv, &spec, arg)?);
    }

    Ok(out)
}

fn render_one(conv: char, spec: &Spec, arg: &FormatArg<'_>) -> Result<String, FormatError> {
    // the 0 flag is dropped for integer conversions with a precision, and
    // never applies to strings
    let zero_pad = match conv {
        'd' | 'i' | 'u' | 'x' | 'X' | 'o' => spec.zero && spec.precision.is_none(),
        'f' | 'F' | 'e' | 'E' | 'g' | 'G' => spec.zero,
        _ => false,
    };
    let body = match conv {
        'd' | 'i' => int_body(numeric(arg, conv)?.as_i128().to_string(), spec),
        'u' => int_body(numeric(arg, conv)?.as_u128().to_string(), spec),
        'x' => int_body(format!("{:x}", numeric(arg, conv)?.as_u128()), spec),
        'X' => int_body(format!("{:X}", numeric(arg, conv)?.as_u128()), spec),
        'o' => int_body(format!("{:o}", numeric(arg, conv)?.as_u128()), spec),
        'f' | 'F' => {
            let prec = spec.precision.unwrap_or(6);
            format!("{:.*}", prec, numeric(arg, conv)?.as_f64())
        }
        'e' | 'E' => {
            let prec = spec.precision.unwrap_or(6);
            let s = c_style_exponent(format!("{:.*e}", prec, numeric(arg, conv)?.as_f64()));
            if conv == 'E' { s.to_uppercase() } else { s }
        }
        'g' | 'G' => {
            let s = general_form(numeric(arg, conv)?.as_f64(), spec.precision);
            if conv == 'G' { s.to_uppercase() } else { s }
        }
        's' => {
            let full = match arg {
                FormatArg::Text(t) => (*t).to_string(),
                FormatArg::Scalar(s) => s.to_string(),
            };
            match spec.precision {
                Some(p) => truncate_chars(&full, p),
                None => full,
            }
        }
        other => return UnknownConversionSnafu { conversion: other }.fail(),
    };
    Ok(pad(body, spec, zero_pad))
}

fn numeric(arg: &FormatArg<'_>, conversion: char) -> Result<Scalar, FormatError> {
    match arg {
        FormatArg::Scalar(s) => Ok(*s),
        FormatArg::Text(_) => NumericOnTextSnafu { conversion }.fail(),
    }
}

/// Apply an integer precision (minimum digit count) to a rendered integer.
fn int_body(digits: String, spec: &Spec) -> String {
    let Some(prec) = spec.precision else {
        return digits;
    };
    let (sign, magnitude) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits.as_str()),
    };
    if magnitude.len() >= prec {
        return digits;
    }
    format!("{sign}{}{magnitude}", "0".repeat(prec - magnitude.len()))
}

fn pad(body: String, spec: &Spec, zero_pad: bool) -> String {
    let Some(width) = spec.width else {
        return body;
    };
    if body.chars().count() >= width {
        return body;
    }
    if spec.left {
        return format!("{body:<width$}");
    }
    if zero_pad {
        let (sign, magnitude) = match body.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", body.as_str()),
        };
        let fill = width - sign.len() - magnitude.chars().count();
        return format!("{sign}{}{magnitude}", "0".repeat(fill));
    }
    format!("{body:>width$}")
}

/// C-style `%g`: `precision` significant digits (default 6, minimum 1),
/// fixed notation while the decimal exponent fits in `[-4, precision)`,
/// scientific notation otherwise, trailing zeros trimmed either way.
fn general_form(v: f64, precision: Option<usize>) -> String {
    let prec = precision.unwrap_or(6).max(1);
    if !v.is_finite() {
        return format!("{v}");
    }
    // round to the significant digit count first; the rounding itself can
    // carry into the next exponent (999999.5 becomes 1e+06 at six digits)
    let sci = format!("{:.*e}", prec - 1, v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i64 = exp.parse().unwrap_or(0);
    if exp >= -4 && exp < prec as i64 {
        let frac = (prec as i64 - 1 - exp).max(0) as usize;
        trim_trailing_zeros(format!("{:.*}", frac, v))
    } else {
        let mantissa = trim_trailing_zeros(mantissa.to_string());
        let (sign, magnitude) = if exp < 0 { ('-', -exp) } else { ('+', exp) };
        format!("{mantissa}e{sign}{magnitude:02}")
    }
}

fn trim_trailing_zeros(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Rust renders exponents as `e0`; C renders them as `e+00`.
fn c_style_exponent(s: String) -> String {
    let Some(epos) = s.find(['e', 'E']) else {
        return s;
    };
    let (mantissa, exp) = s.split_at(epos);
    let exp = &exp[1..];
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(rest) => ('-', rest),
        None => ('+', exp),
    };
    if digits.len() >= 2 {
        format!("{mantissa}e{sign}{digits}")
    } else {
        format!("{mantissa}e{sign}0{digits}")
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(s: Scalar) -> String {
        render_arg("%d", s)
    }

    fn render_arg(template: &str, s: Scalar) -> String {
        render(template, &FormatArg::Scalar(s)).expect("render")
    }

    #[test]
    fn plain_integers() {
        assert_eq!(scalar(Scalar::I32(7)), "7");
        assert_eq!(scalar(Scalar::I32(-1)), "-1");
        assert_eq!(render_arg("%u", Scalar::U64(18)), "18");
        assert_eq!(render_arg("%x", Scalar::U32(255)), "ff");
        assert_eq!(render_arg("%X", Scalar::U32(255)), "FF");
    }

    #[test]
    fn fixed_point_precision() {
        assert_eq!(render_arg("%.3f", Scalar::F64(2.5)), "2.500");
        assert_eq!(render_arg("%.3f", Scalar::F64(0.0)), "0.000");
        assert_eq!(render_arg("%f", Scalar::F64(1.5)), "1.500000");
        assert_eq!(render_arg("%.10g", Scalar::F64(0.5)), "0.5");
    }

    #[test]
    fn general_form_honors_significant_digits() {
        assert_eq!(render_arg("%.3g", Scalar::F64(2.5)), "2.5");
        assert_eq!(render_arg("%.3g", Scalar::F64(1234.0)), "1.23e+03");
        assert_eq!(render_arg("%.2g", Scalar::F64(0.0000123)), "1.2e-05");
        assert_eq!(render_arg("%g", Scalar::F64(0.0001234)), "0.0001234");
        assert_eq!(render_arg("%g", Scalar::F64(1234567.0)), "1.23457e+06");
        assert_eq!(render_arg("%g", Scalar::F64(100.0)), "100");
        assert_eq!(render_arg("%g", Scalar::F64(0.0)), "0");
        assert_eq!(render_arg("%G", Scalar::F64(1234.5678)), "1234.57");
        assert_eq!(render_arg("%.1G", Scalar::F64(0.00002)), "2E-05");
    }

    #[test]
    fn negative_values_reinterpret_at_their_own_width() {
        assert_eq!(render_arg("%x", Scalar::I32(-1)), "ffffffff");
        assert_eq!(render_arg("%X", Scalar::I8(-2)), "FE");
        assert_eq!(render_arg("%u", Scalar::I16(-1)), "65535");
        assert_eq!(render_arg("%u", Scalar::I64(-1)), "18446744073709551615");
        assert_eq!(render_arg("%o", Scalar::I8(-1)), "377");
    }

    #[test]
    fn width_and_flags() {
        assert_eq!(render_arg("%5d", Scalar::I32(42)), "   42");
        assert_eq!(render_arg("%-5d|", Scalar::I32(42)), "42   |");
        assert_eq!(render_arg("%05d", Scalar::I32(-42)), "-0042");
        assert_eq!(render_arg("%08.3f", Scalar::F64(1.25)), "0001.250");
        // a precision turns the 0 flag off for integers
        assert_eq!(render_arg("%08.3d", Scalar::I32(42)), "     042");
    }

    #[test]
    fn length_modifiers_ignored() {
        assert_eq!(render_arg("%zu", Scalar::U64(9)), "9");
        assert_eq!(render_arg("%lld", Scalar::I64(-9)), "-9");
        assert_eq!(render_arg("%hd", Scalar::I16(3)), "3");
    }

    #[test]
    fn strings() {
        let arg = FormatArg::Text("hello");
        assert_eq!(render("%s", &arg).expect("render"), "hello");
        assert_eq!(render("%.3s", &arg).expect("render"), "hel");
        assert_eq!(render("%8s", &arg).expect("render"), "   hello");
    }

    #[test]
    fn literal_text_and_percent() {
        assert_eq!(render_arg("t=%d ms", Scalar::I32(5)), "t=5 ms");
        assert_eq!(render_arg("%d%%", Scalar::I32(5)), "5%");
    }

    #[test]
    fn scientific_exponent_shape() {
        assert_eq!(render_arg("%.2e", Scalar::F64(2.5)), "2.50e+00");
        assert_eq!(render_arg("%.1e", Scalar::F64(0.025)), "2.5e-02");
    }

    #[test]
    fn errors() {
        assert_eq!(
            render("%q", &FormatArg::Scalar(Scalar::I32(1))),
            Err(FormatError::UnknownConversion { conversion: 'q' })
        );
        assert_eq!(
            render("%d", &FormatArg::Text("nope")),
            Err(FormatError::NumericOnText { conversion: 'd' })
        );
        assert_eq!(
            render("%", &FormatArg::Scalar(Scalar::I32(1))),
            Err(FormatError::Truncated)
        );
    }

    #[test]
    fn bool_renders_through_integer_and_string() {
        assert_eq!(render_arg("%d", Scalar::Bool(true)), "1");
        assert_eq!(
            render("%s", &FormatArg::Scalar(Scalar::Bool(true))).expect("render"),
            "true"
        );
    }
}
