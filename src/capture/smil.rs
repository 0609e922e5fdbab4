//! Freeze SMIL animations at a point in time.
//!
//! resvg renders static documents only, so the built-in rasterizer rewrites the markup before
//! each capture: every animation element is removed and its value at time `t` is written onto
//! the parent element. Supported: `animate`, `set` and `animateTransform`, targeting their parent.

use std::{borrow::Cow, ops::Range};

use crate::{
    foundation::color::{Rgba8, parse_color},
    timing::{
        analyze::parse_clock_value,
        markup::{Tag, TagKind, tags},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AnimKind {
    Animate,
    Set,
    Transform,
}

impl AnimKind {
    fn of(tag: &Tag<'_>) -> Option<Self> {
        match tag.local_name() {
            "animate" | "animateColor" => Some(Self::Animate),
            "set" => Some(Self::Set),
            "animateTransform" => Some(Self::Transform),
            "animateMotion" => Some(Self::Animate),
            _ => None,
        }
    }
}

struct Element<'a> {
    tag: Tag<'a>,
    overrides: Vec<(String, String)>,
}

impl Element<'_> {
    fn current(&self, attr: &str) -> Option<&str> {
        self.overrides
            .iter()
            .rev()
            .find(|(n, _)| n == attr)
            .map(|(_, v)| v.as_str())
            .or_else(|| self.tag.attr(attr))
    }

    fn set(&mut self, attr: String, value: String) {
        self.overrides.retain(|(n, _)| *n != attr);
        self.overrides.push((attr, value));
    }
}

/// Return `markup` with all animations resolved at `t` seconds.
pub fn apply_at(markup: &str, t: f64) -> Cow<'_, str> {
    let mut elements: Vec<Element<'_>> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut removals: Vec<Range<usize>> = Vec::new();
    // (removal start, nesting depth) while inside a non-empty animation element.
    let mut skipping: Option<(usize, usize)> = None;

    for tag in tags(markup) {
        if let Some((start, depth)) = skipping.as_mut() {
            match tag.kind {
                TagKind::Start => *depth += 1,
                TagKind::End => *depth -= 1,
                TagKind::Empty => {}
            }
            if *depth == 0 {
                removals.push(*start..tag.span.end);
                skipping = None;
            }
            continue;
        }

        if tag.kind != TagKind::End
            && let Some(kind) = AnimKind::of(&tag)
        {
            if let Some(&parent) = stack.last()
                && let Some((attr, value)) = evaluate(kind, &tag, &elements[parent], t)
            {
                elements[parent].set(attr, value);
            }
            match tag.kind {
                TagKind::Start => skipping = Some((tag.span.start, 1)),
                _ => removals.push(tag.span.clone()),
            }
            continue;
        }

        match tag.kind {
            TagKind::Start => {
                stack.push(elements.len());
                elements.push(Element {
                    tag,
                    overrides: Vec::new(),
                });
            }
            TagKind::End => {
                stack.pop();
            }
            TagKind::Empty => {}
        }
    }
    if let Some((start, _)) = skipping {
        removals.push(start..markup.len());
    }

    if removals.is_empty() {
        return Cow::Borrowed(markup);
    }

    let mut edits: Vec<(Range<usize>, String)> = removals
        .into_iter()
        .map(|r| (r, String::new()))
        .collect();
    for el in elements.iter().filter(|e| !e.overrides.is_empty()) {
        edits.push((el.tag.span.clone(), rewrite_start_tag(markup, el)));
    }
    edits.sort_by_key(|(r, _)| r.start);

    let mut out = String::with_capacity(markup.len());
    let mut pos = 0;
    for (range, text) in edits {
        if range.start < pos {
            continue;
        }
        out.push_str(&markup[pos..range.start]);
        out.push_str(&text);
        pos = range.end;
    }
    out.push_str(&markup[pos..]);
    Cow::Owned(out)
}

fn rewrite_start_tag(src: &str, el: &Element<'_>) -> String {
    let tag = &el.tag;
    let bytes = src.as_bytes();
    let mut replacements: Vec<(Range<usize>, String)> = Vec::new();
    let mut inserted = String::new();

    for (name, value) in &el.overrides {
        match tag.attr_entry(name) {
            Some(a) => {
                let quote = a
                    .value_span
                    .start
                    .checked_sub(1)
                    .map(|i| bytes[i])
                    .filter(|&b| matches!(b, b'"' | b'\''));
                let text = match quote {
                    Some(q) => escape(value, q as char),
                    None if a.value_span.is_empty() => format!("=\"{}\"", escape(value, '"')),
                    None => escape(value, ' '),
                };
                replacements.push((a.value_span, text));
            }
            None => {
                inserted.push_str(&format!(" {name}=\"{}\"", escape(value, '"')));
            }
        }
    }
    replacements.push((tag.insert_point()..tag.insert_point(), inserted));
    replacements.sort_by_key(|(r, _)| r.start);

    let mut out = String::new();
    let mut pos = tag.span.start;
    for (range, text) in replacements {
        out.push_str(&src[pos..range.start]);
        out.push_str(&text);
        pos = range.end;
    }
    out.push_str(&src[pos..tag.span.end]);
    out
}

fn escape(value: &str, quote: char) -> String {
    match quote {
        '"' => value.replace('"', "&quot;"),
        '\'' => value.replace('\'', "&apos;"),
        _ => value.to_owned(),
    }
}

fn evaluate(
    kind: AnimKind,
    anim: &Tag<'_>,
    target: &Element<'_>,
    t: f64,
) -> Option<(String, String)> {
    let attr = match anim.attr("attributeName") {
        Some(a) => a.to_owned(),
        None if kind == AnimKind::Transform => "transform".to_owned(),
        None => return None,
    };

    let begin = match anim.attr("begin") {
        Some(b) => parse_clock_value(b)?,
        None => 0.0,
    };
    if t < begin {
        return None;
    }
    let dur = anim
        .attr("dur")
        .and_then(parse_clock_value)
        .filter(|d| *d > 0.0);
    let freeze = anim.attr("fill") == Some("freeze");

    if kind == AnimKind::Set {
        if let Some(d) = dur
            && t >= begin + d
            && !freeze
        {
            return None;
        }
        return Some((attr, anim.attr("to")?.to_owned()));
    }

    let dur = dur?;
    let repeat = match anim.attr("repeatCount").map(str::trim) {
        Some("indefinite") => f64::INFINITY,
        Some(n) => n.parse::<f64>().ok().filter(|n| *n > 0.0).unwrap_or(1.0),
        None => 1.0,
    };
    let active_end = begin + dur * repeat;

    let progress = if t >= active_end {
        if !freeze {
            return None;
        }
        let frac = repeat.fract();
        if frac == 0.0 { 1.0 } else { frac }
    } else {
        ((t - begin) % dur) / dur
    };

    let base = target.current(&attr);
    let values = keyframes(kind, anim, base)?;
    let discrete = anim.attr("calcMode") == Some("discrete");
    let value = sample(&values, progress, discrete);

    if kind == AnimKind::Transform {
        let ty = anim.attr("type").unwrap_or("translate");
        let step = format!("{ty}({value})");
        let value = match base {
            Some(b) if anim.attr("additive") == Some("sum") && !b.trim().is_empty() => {
                format!("{} {step}", b.trim())
            }
            _ => step,
        };
        return Some((attr, value));
    }
    Some((attr, value))
}

fn keyframes(kind: AnimKind, anim: &Tag<'_>, base: Option<&str>) -> Option<Vec<String>> {
    if let Some(values) = anim.attr("values") {
        let list: Vec<String> = values
            .split(';')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .collect();
        return (!list.is_empty()).then_some(list);
    }

    let to = anim.attr("to")?;
    let from = match anim.attr("from") {
        Some(f) => f.to_owned(),
        None if kind == AnimKind::Transform => {
            if anim.attr("type") == Some("scale") { "1" } else { "0" }.to_owned()
        }
        None => base?.to_owned(),
    };
    Some(vec![from, to.to_owned()])
}

fn sample(values: &[String], progress: f64, discrete: bool) -> String {
    let n = values.len();
    if n == 1 {
        return values[0].clone();
    }
    let p = progress.clamp(0.0, 1.0);
    if discrete {
        let i = ((p * n as f64).floor() as usize).min(n - 1);
        return values[i].clone();
    }
    let seg = p * (n - 1) as f64;
    let i = (seg.floor() as usize).min(n - 2);
    interpolate(&values[i], &values[i + 1], seg - i as f64)
}

/// Interpolate two attribute values. Colors and number lists with a matching shape blend
/// linearly; anything else switches at the midpoint.
pub(crate) fn interpolate(a: &str, b: &str, frac: f64) -> String {
    if let (Ok(ca), Ok(cb)) = (parse_color(a), parse_color(b)) {
        return lerp_color(ca, cb, frac);
    }

    let (na, sa) = split_numbers(a);
    let (nb, sb) = split_numbers(b);
    if !na.is_empty() && na.len() == nb.len() && sa == sb {
        let mut out = String::with_capacity(a.len());
        for (i, text) in sa.iter().enumerate() {
            out.push_str(text);
            if let (Some(x), Some(y)) = (na.get(i), nb.get(i)) {
                out.push_str(&format_number(x + (y - x) * frac));
            }
        }
        return out;
    }

    if frac < 0.5 { a } else { b }.to_owned()
}

fn lerp_color(a: Rgba8, b: Rgba8, frac: f64) -> String {
    let mix = |x: u8, y: u8| (f64::from(x) + (f64::from(y) - f64::from(x)) * frac).round() as u8;
    let (r, g, bl, al) = (mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b), mix(a.a, b.a));
    if al == 255 {
        format!("rgb({r},{g},{bl})")
    } else {
        format!("rgba({r},{g},{bl},{})", format_number(f64::from(al) / 255.0))
    }
}

/// Split into numbers and the text between them (`text.len() == numbers.len() + 1`).
fn split_numbers(s: &str) -> (Vec<f64>, Vec<&str>) {
    let bytes = s.as_bytes();
    let mut numbers = Vec::new();
    let mut text = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let starts_number = bytes[i].is_ascii_digit()
            || (bytes[i] == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
            || (matches!(bytes[i], b'-' | b'+')
                && bytes
                    .get(i + 1)
                    .is_some_and(|b| b.is_ascii_digit() || *b == b'.'));
        if !starts_number {
            i += 1;
            continue;
        }

        let start = i;
        if matches!(bytes[i], b'-' | b'+') {
            i += 1;
        }
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            i += 1;
        }
        if i < bytes.len()
            && matches!(bytes[i], b'e' | b'E')
            && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit() || matches!(*b, b'-' | b'+'))
        {
            i += 2;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }

        match s[start..i].parse::<f64>() {
            Ok(v) => {
                text.push(&s[text_start..start]);
                numbers.push(v);
                text_start = i;
            }
            Err(_) => continue,
        }
    }
    text.push(&s[text_start..]);
    (numbers, text)
}

fn format_number(v: f64) -> String {
    let s = format!("{v:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_owned() } else { s.to_owned() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_without_animation_is_borrowed() {
        let svg = r#"<svg><rect width="1"/></svg>"#;
        assert!(matches!(apply_at(svg, 1.0), Cow::Borrowed(_)));
    }

    #[test]
    fn linear_from_to_midpoint() {
        let svg = r#"<svg><rect opacity="0"><animate attributeName="opacity" from="0" to="1" dur="2s"/></rect></svg>"#;
        assert_eq!(apply_at(svg, 1.0), r#"<svg><rect opacity="0.5"></rect></svg>"#);
    }

    #[test]
    fn missing_attribute_is_inserted() {
        let svg = r#"<svg><circle r="1"><animate attributeName="cx" from="0" to="10" dur="1s"/></circle></svg>"#;
        assert_eq!(
            apply_at(svg, 0.25),
            r#"<svg><circle r="1" cx="2.5"></circle></svg>"#
        );
    }

    #[test]
    fn before_begin_and_after_end_without_freeze_keep_base_value() {
        let svg = r#"<svg><rect x="5"><animate attributeName="x" begin="1s" from="0" to="10" dur="1s"/></rect></svg>"#;
        assert_eq!(apply_at(svg, 0.5), r#"<svg><rect x="5"></rect></svg>"#);
        assert_eq!(apply_at(svg, 3.0), r#"<svg><rect x="5"></rect></svg>"#);
    }

    #[test]
    fn freeze_holds_the_final_value() {
        let svg = r#"<svg><rect x="5"><animate attributeName="x" from="0" to="10" dur="1s" fill="freeze"/></rect></svg>"#;
        assert_eq!(apply_at(svg, 5.0), r#"<svg><rect x="10"></rect></svg>"#);
    }

    #[test]
    fn values_list_and_indefinite_repeat() {
        let svg = r#"<svg><g><animate attributeName="y" values="0;10;0" dur="2s" repeatCount="indefinite"></animate></g></svg>"#;
        assert_eq!(apply_at(svg, 1.0), r#"<svg><g y="10"></g></svg>"#);
        assert_eq!(apply_at(svg, 2.5), r#"<svg><g y="5"></g></svg>"#);
    }

    #[test]
    fn discrete_mode_steps() {
        let svg = r#"<svg><g><animate attributeName="visibility" values="hidden;visible" calcMode="discrete" dur="1s"/></g></svg>"#;
        assert_eq!(apply_at(svg, 0.2), r#"<svg><g visibility="hidden"></g></svg>"#);
        assert_eq!(apply_at(svg, 0.7), r#"<svg><g visibility="visible"></g></svg>"#);
    }

    #[test]
    fn set_applies_from_begin() {
        let svg = r#"<svg><g fill="red"><set attributeName="fill" to="blue" begin="1s"/></g></svg>"#;
        assert_eq!(apply_at(svg, 0.0), r#"<svg><g fill="red"></g></svg>"#);
        assert_eq!(apply_at(svg, 1.0), r#"<svg><g fill="blue"></g></svg>"#);
    }

    #[test]
    fn additive_transform_appends_to_base() {
        let svg = r#"<svg><g transform="translate(5 5)"><animateTransform attributeName="transform" type="rotate" from="0 50 50" to="360 50 50" dur="4s" additive="sum"/></g></svg>"#;
        assert_eq!(
            apply_at(svg, 1.0),
            r#"<svg><g transform="translate(5 5) rotate(90 50 50)"></g></svg>"#
        );
    }

    #[test]
    fn colors_blend() {
        assert_eq!(interpolate("#000000", "#ffffff", 0.5), "rgb(128,128,128)");
        assert_eq!(interpolate("red", "blue", 0.0), "rgb(255,0,0)");
    }

    #[test]
    fn mismatched_shapes_switch_at_midpoint() {
        assert_eq!(interpolate("M0 0 L1 1", "M0 0", 0.4), "M0 0 L1 1");
        assert_eq!(interpolate("M0 0 L1 1", "M0 0", 0.6), "M0 0");
        assert_eq!(interpolate("M0,0 L10,-4", "M2,2 L20,4", 0.5), "M1,1 L15,0");
    }

    #[test]
    fn click_triggered_animation_never_starts() {
        let svg = r#"<svg><rect x="1"><animate attributeName="x" begin="click" to="9" dur="1s"/></rect></svg>"#;
        assert_eq!(apply_at(svg, 0.5), r#"<svg><rect x="1"></rect></svg>"#);
    }
}
