//! Color and font-property parsing for drawing arguments.
//!
//! Colors accept hex (`#RRGGBB`, `#RGB`), a small set of names, `grayN`
//! (0 = black, 100 = white) and cycle references `C0`..`C9`.
//!
//! Font properties accept a shorthand string, `<size>[b][i]`:
//! `"10b"` is 10 pt bold, `"12"` plain, `"14bi"` bold italic. A mapping
//! `{size, weight, style, family}` is also accepted.

use nom::{
    branch::alt,
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res, opt, recognize},
    multi::many0,
    sequence::{pair, preceded},
    IResult,
};
use plotters::style::RGBColor;
use serde_yaml::Value;

/// Default dataset color cycle.
pub const COLOR_CYCLE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

const NAMED: &[(&str, RGBColor)] = &[
    ("white", RGBColor(255, 255, 255)),
    ("black", RGBColor(0, 0, 0)),
    ("red", RGBColor(255, 0, 0)),
    ("green", RGBColor(0, 128, 0)),
    ("blue", RGBColor(0, 0, 255)),
    ("yellow", RGBColor(255, 255, 0)),
    ("cyan", RGBColor(0, 255, 255)),
    ("magenta", RGBColor(255, 0, 255)),
    ("orange", RGBColor(255, 165, 0)),
    ("purple", RGBColor(128, 0, 128)),
    ("brown", RGBColor(139, 69, 19)),
    ("gray", RGBColor(128, 128, 128)),
    ("grey", RGBColor(128, 128, 128)),
    ("lightgray", RGBColor(211, 211, 211)),
    ("darkgray", RGBColor(64, 64, 64)),
];

/// Color for dataset `index` in the default cycle.
pub fn cycle_color(index: usize) -> RGBColor {
    COLOR_CYCLE[index % COLOR_CYCLE.len()]
}

/// Parse a color string; `None` if it is not recognized.
pub fn parse_color(text: &str) -> Option<RGBColor> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = text.to_ascii_lowercase();
    if let Some((_, color)) = NAMED.iter().find(|(name, _)| *name == lower) {
        return Some(*color);
    }
    if let Some(n) = lower.strip_prefix('c').and_then(|n| n.parse::<usize>().ok()) {
        return Some(cycle_color(n));
    }
    let level = lower
        .strip_prefix("gray")
        .or_else(|| lower.strip_prefix("grey"))?
        .parse::<u8>()
        .ok()
        .filter(|n| *n <= 100)?;
    let v = (f64::from(level) * 2.55).round() as u8;
    Some(RGBColor(v, v, v))
}

fn parse_hex(hex: &str) -> Option<RGBColor> {
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(RGBColor(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
        3 => Some(RGBColor(
            channel(&hex[0..1])? * 17,
            channel(&hex[1..2])? * 17,
            channel(&hex[2..3])? * 17,
        )),
        _ => None,
    }
}

/// Resolved font properties.
#[derive(Debug, Clone, PartialEq)]
pub struct FontProps {
    pub size: f64,
    pub bold: bool,
    pub italic: bool,
    pub family: String,
}

impl Default for FontProps {
    fn default() -> Self {
        FontProps {
            size: 10.0,
            bold: false,
            italic: false,
            family: "sans-serif".to_string(),
        }
    }
}

impl FontProps {
    /// Read a font argument: shorthand string, bare number, or mapping.
    pub fn from_value(value: &Value) -> Option<FontProps> {
        match value {
            Value::String(s) => parse_font_shorthand(s),
            Value::Number(n) => n.as_f64().map(|size| FontProps { size, ..Default::default() }),
            Value::Mapping(m) => {
                let mut props = FontProps::default();
                if let Some(size) = m.get("size").and_then(Value::as_f64) {
                    props.size = size;
                }
                props.bold = m.get("weight").and_then(Value::as_str) == Some("bold");
                props.italic = m.get("style").and_then(Value::as_str) == Some("italic");
                if let Some(family) = m.get("family").and_then(Value::as_str) {
                    props.family = family.to_string();
                }
                Some(props)
            }
            _ => None,
        }
    }

    /// Size in pixels at `dpi`.
    pub fn pixel_size(&self, dpi: f64) -> f64 {
        self.size * dpi / 72.0
    }
}

fn number(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(pair(digit1, opt(preceded(char('.'), digit1)))),
        str::parse::<f64>,
    )(input)
}

fn font_shorthand(input: &str) -> IResult<&str, (f64, Vec<char>)> {
    pair(number, many0(alt((char('b'), char('i')))))(input)
}

/// Parse `<size>[b][i]`.
pub fn parse_font_shorthand(text: &str) -> Option<FontProps> {
    let (_, (size, flags)) = all_consuming(font_shorthand)(text.trim()).ok()?;
    Some(FontProps {
        size,
        bold: flags.contains(&'b'),
        italic: flags.contains(&'i'),
        ..Default::default()
    })
}
