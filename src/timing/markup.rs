//! Minimal tag scanner for SVG markup.
//!
//! This is not an XML parser. It walks `<...>` tags in document order, skipping comments, CDATA,
//! doctype and processing instructions, and exposes attributes together with their byte ranges
//! so callers can rewrite individual values in place.

use std::ops::Range;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagKind {
    /// `<g ...>`
    Start,
    /// `</g>`
    End,
    /// `<rect ... />`
    Empty,
}

#[derive(Clone, Debug)]
pub struct Tag<'a> {
    pub name: &'a str,
    pub kind: TagKind,
    /// Byte range of the whole tag, `<` through `>`.
    pub span: Range<usize>,
    src: &'a str,
    attrs: Range<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attr<'a> {
    pub name: &'a str,
    pub value: &'a str,
    /// Byte range of the value (without quotes) in the source.
    pub value_span: Range<usize>,
}

impl<'a> Tag<'a> {
    /// Element name without any namespace prefix.
    pub fn local_name(&self) -> &'a str {
        self.name.rsplit(':').next().unwrap_or(self.name)
    }

    pub fn attrs(&self) -> Attrs<'a> {
        Attrs {
            src: self.src,
            pos: self.attrs.start,
            end: self.attrs.end,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.attr_entry(name).map(|a| a.value)
    }

    pub fn attr_entry(&self, name: &str) -> Option<Attr<'a>> {
        self.attrs().find(|a| a.name == name)
    }

    /// Offset where a new attribute can be inserted (before `>` or `/>`).
    pub fn insert_point(&self) -> usize {
        self.attrs.end
    }
}

pub struct Attrs<'a> {
    src: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> Iterator for Attrs<'a> {
    type Item = Attr<'a>;

    fn next(&mut self) -> Option<Attr<'a>> {
        let bytes = self.src.as_bytes();
        loop {
            while self.pos < self.end && bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos >= self.end {
                return None;
            }

            let name_start = self.pos;
            while self.pos < self.end
                && !bytes[self.pos].is_ascii_whitespace()
                && !matches!(bytes[self.pos], b'=' | b'/' | b'>')
            {
                self.pos += 1;
            }
            if self.pos == name_start {
                // Stray `/` or `=`.
                self.pos += 1;
                continue;
            }
            let name = &self.src[name_start..self.pos];

            let mut look = self.pos;
            while look < self.end && bytes[look].is_ascii_whitespace() {
                look += 1;
            }
            if look >= self.end || bytes[look] != b'=' {
                return Some(Attr {
                    name,
                    value: "",
                    value_span: self.pos..self.pos,
                });
            }
            look += 1;
            while look < self.end && bytes[look].is_ascii_whitespace() {
                look += 1;
            }

            let (value_start, value_end, next) = match bytes.get(look) {
                Some(&q @ (b'"' | b'\'')) if look < self.end => {
                    let start = look + 1;
                    let mut i = start;
                    while i < self.end && bytes[i] != q {
                        i += 1;
                    }
                    (start, i, (i + 1).min(self.end))
                }
                _ => {
                    let start = look;
                    let mut i = start;
                    while i < self.end && !bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    (start, i, i)
                }
            };
            self.pos = next;
            return Some(Attr {
                name,
                value: &self.src[value_start..value_end],
                value_span: value_start..value_end,
            });
        }
    }
}

pub struct Tags<'a> {
    src: &'a str,
    pos: usize,
}

/// Iterate over the tags of `src` in document order.
pub fn tags(src: &str) -> Tags<'_> {
    Tags { src, pos: 0 }
}

impl<'a> Tags<'a> {
    fn skip_past(&mut self, from: usize, terminator: &str) {
        self.pos = match self.src[from..].find(terminator) {
            Some(i) => from + i + terminator.len(),
            None => self.src.len(),
        };
    }
}

impl<'a> Iterator for Tags<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        let bytes = self.src.as_bytes();
        loop {
            let start = self.pos + self.src.get(self.pos..)?.find('<')?;
            let rest = &self.src[start..];

            if rest.starts_with("<!--") {
                self.skip_past(start + 4, "-->");
                continue;
            }
            if rest.starts_with("<![CDATA[") {
                self.skip_past(start + 9, "]]>");
                continue;
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                self.skip_past(start + 2, ">");
                continue;
            }

            let closing = rest.starts_with("</");
            let name_start = start + if closing { 2 } else { 1 };
            let mut i = name_start;
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && !matches!(bytes[i], b'/' | b'>' | b'<')
            {
                i += 1;
            }
            if i == name_start {
                // A bare `<` in text content.
                self.pos = start + 1;
                continue;
            }
            let name_end = i;

            let mut quote = None;
            let mut gt = None;
            while i < bytes.len() {
                let b = bytes[i];
                match quote {
                    Some(q) if b == q => quote = None,
                    Some(_) => {}
                    None if b == b'"' || b == b'\'' => quote = Some(b),
                    None if b == b'>' => {
                        gt = Some(i);
                        break;
                    }
                    None => {}
                }
                i += 1;
            }
            let gt = gt?;
            self.pos = gt + 1;

            let mut attrs_end = gt;
            let kind = if closing {
                TagKind::End
            } else {
                let mut j = gt;
                while j > name_end && bytes[j - 1].is_ascii_whitespace() {
                    j -= 1;
                }
                if j > name_end && bytes[j - 1] == b'/' {
                    attrs_end = j - 1;
                    TagKind::Empty
                } else {
                    TagKind::Start
                }
            };

            return Some(Tag {
                name: &self.src[name_start..name_end],
                kind,
                span: start..gt + 1,
                src: self.src,
                attrs: name_end..attrs_end,
            });
        }
    }
}
