use crate::foundation::error::{Svg2GifError, Svg2GifResult};

/// Straight-alpha RGBA8 color used for the page background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

const NAMED: &[(&str, Rgba8)] = &[
    ("black", Rgba8::rgb(0, 0, 0)),
    ("white", Rgba8::rgb(255, 255, 255)),
    ("red", Rgba8::rgb(255, 0, 0)),
    ("green", Rgba8::rgb(0, 128, 0)),
    ("lime", Rgba8::rgb(0, 255, 0)),
    ("blue", Rgba8::rgb(0, 0, 255)),
    ("yellow", Rgba8::rgb(255, 255, 0)),
    ("cyan", Rgba8::rgb(0, 255, 255)),
    ("aqua", Rgba8::rgb(0, 255, 255)),
    ("magenta", Rgba8::rgb(255, 0, 255)),
    ("fuchsia", Rgba8::rgb(255, 0, 255)),
    ("gray", Rgba8::rgb(128, 128, 128)),
    ("grey", Rgba8::rgb(128, 128, 128)),
    ("silver", Rgba8::rgb(192, 192, 192)),
    ("maroon", Rgba8::rgb(128, 0, 0)),
    ("olive", Rgba8::rgb(128, 128, 0)),
    ("navy", Rgba8::rgb(0, 0, 128)),
    ("purple", Rgba8::rgb(128, 0, 128)),
    ("teal", Rgba8::rgb(0, 128, 128)),
    ("orange", Rgba8::rgb(255, 165, 0)),
    ("pink", Rgba8::rgb(255, 192, 203)),
    ("transparent", Rgba8::rgba(0, 0, 0, 0)),
];

/// Parse a CSS-style color: `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(..)`, `rgba(..)` or a name.
pub fn parse_color(s: &str) -> Svg2GifResult<Rgba8> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Svg2GifError::invalid_input("background color must not be empty"));
    }

    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex).map_err(Svg2GifError::invalid_input);
    }

    let lower = s.to_ascii_lowercase();
    if let Some(args) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return parse_rgb_fn(args).map_err(Svg2GifError::invalid_input);
    }

    NAMED
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, c)| *c)
        .ok_or_else(|| Svg2GifError::invalid_input(format!("unknown color \"{s}\"")))
}

fn parse_hex(s: &str) -> Result<Rgba8, String> {
    fn hex_byte(pair: &str) -> Result<u8, String> {
        u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte \"{pair}\""))
    }

    if !s.is_ascii() {
        return Err(format!("invalid hex color \"#{s}\""));
    }

    match s.len() {
        3 => {
            let mut out = [0u8; 3];
            for (i, c) in s.chars().enumerate() {
                let v = hex_byte(&c.to_string())?;
                out[i] = v * 17;
            }
            Ok(Rgba8::rgb(out[0], out[1], out[2]))
        }
        6 => Ok(Rgba8::rgb(
            hex_byte(&s[0..2])?,
            hex_byte(&s[2..4])?,
            hex_byte(&s[4..6])?,
        )),
        8 => Ok(Rgba8::rgba(
            hex_byte(&s[0..2])?,
            hex_byte(&s[2..4])?,
            hex_byte(&s[4..6])?,
            hex_byte(&s[6..8])?,
        )),
        _ => Err("hex color must be #RGB, #RRGGBB or #RRGGBBAA".to_owned()),
    }
}

fn parse_rgb_fn(args: &str) -> Result<Rgba8, String> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err(format!("rgb()/rgba() expects 3 or 4 components, got {}", parts.len()));
    }

    fn channel(p: &str) -> Result<u8, String> {
        let v: f64 = p
            .parse()
            .map_err(|_| format!("invalid color channel \"{p}\""))?;
        Ok(v.clamp(0.0, 255.0).round() as u8)
    }

    let a = match parts.get(3) {
        Some(p) => {
            let v: f64 = p.parse().map_err(|_| format!("invalid alpha \"{p}\""))?;
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        None => 255,
    };

    Ok(Rgba8::rgba(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        a,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(parse_color("#ff0000").unwrap(), Rgba8::rgb(255, 0, 0));
        assert_eq!(parse_color("#0f0").unwrap(), Rgba8::rgb(0, 255, 0));
        assert_eq!(
            parse_color("#0000ff80").unwrap(),
            Rgba8::rgba(0, 0, 255, 128)
        );
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!(parse_color("White").unwrap(), Rgba8::rgb(255, 255, 255));
        assert_eq!(parse_color("transparent").unwrap().a, 0);
    }

    #[test]
    fn parses_rgb_functions() {
        assert_eq!(
            parse_color("rgb(10, 20, 30)").unwrap(),
            Rgba8::rgb(10, 20, 30)
        );
        assert_eq!(
            parse_color("rgba(10,20,30,0.5)").unwrap(),
            Rgba8::rgba(10, 20, 30, 128)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_color("").is_err());
        assert!(parse_color("#12345").is_err());
        assert!(parse_color("notacolor").is_err());
        assert!(parse_color("rgb(1,2)").is_err());
    }
}
