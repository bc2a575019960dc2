//! Recognition of body meta-commands on `0` lines.

use crate::{
    codec::line::{rest_from, tokenize},
    model::{BfcCommand, ElementFlag, MetaCommand, Winding},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TexMapLine<'a> {
    /// `START` with its unparsed arguments
    Start(&'a str),
    /// `NEXT` with its unparsed arguments
    Next(&'a str),
    Fallback,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MetaLine<'a> {
    NoFile,
    Step,
    /// `ROTSTEP` with its unparsed arguments
    RotStep(&'a str),
    Bfc(BfcCommand),
    InvertNext,
    Modifier(ElementFlag),
    GroupBegin(&'a str),
    GroupEnd,
    TexMap(TexMapLine<'a>),
    /// `!:` followed by a geometry line
    Textured(&'a str),
    Legacy(MetaCommand),
    /// Recognised keyword with unusable arguments.
    Malformed(String),
}

/// Classify the body of a `0` line. `None` means an ordinary comment.
pub(crate) fn classify(body: &str) -> Option<MetaLine<'_>> {
    if let Some(inner) = body.strip_prefix("!:") {
        return Some(MetaLine::Textured(inner.trim()));
    }
    let tokens = tokenize(body);
    let keyword = tokens.first()?.text;
    let words: Vec<&str> = tokens.iter().skip(1).map(|t| t.text).collect();
    let rest = rest_from(body, &tokens, 1);
    let meta = match keyword {
        // Named FILE lines end the page before they are classified.
        "FILE" if rest.is_empty() => MetaLine::Malformed("FILE without a file name".to_string()),
        "NOFILE" => MetaLine::NoFile,
        "STEP" if words.is_empty() => MetaLine::Step,
        "STEP" => MetaLine::Malformed("STEP takes no arguments".to_string()),
        "ROTSTEP" => MetaLine::RotStep(rest),
        "BFC" => bfc(&words)?,
        "!LOCKNEXT" => modifier(ElementFlag::Locked, &words),
        "!GHOSTNEXT" => modifier(ElementFlag::Ghosted, &words),
        "!HIDENEXT" => modifier(ElementFlag::Hidden, &words),
        "!LEOCAD" => match words.as_slice() {
            ["GROUP", "BEGIN", ..] => {
                let name = rest_from(body, &tokens, 3);
                if name.is_empty() {
                    MetaLine::Malformed("group without a name".to_string())
                } else {
                    MetaLine::GroupBegin(name)
                }
            }
            ["GROUP", "END"] => MetaLine::GroupEnd,
            ["GROUP", ..] => MetaLine::Malformed(format!("unrecognised group command '{rest}'")),
            // Other LeoCAD extensions are editor-private and stay comments.
            _ => return None,
        },
        "!TEXMAP" => match words.first().copied() {
            Some("START") => MetaLine::TexMap(TexMapLine::Start(rest_from(body, &tokens, 2))),
            Some("NEXT") => MetaLine::TexMap(TexMapLine::Next(rest_from(body, &tokens, 2))),
            Some("FALLBACK") if words.len() == 1 => MetaLine::TexMap(TexMapLine::Fallback),
            Some("END") if words.len() == 1 => MetaLine::TexMap(TexMapLine::End),
            _ => MetaLine::Malformed(format!("unrecognised texture command '{rest}'")),
        },
        "CLEAR" if words.is_empty() => MetaLine::Legacy(MetaCommand::Clear),
        "PAUSE" if words.is_empty() => MetaLine::Legacy(MetaCommand::Pause),
        "SAVE" if words.is_empty() => MetaLine::Legacy(MetaCommand::Save),
        "WRITE" | "PRINT" => MetaLine::Legacy(MetaCommand::Write(rest.to_string())),
        _ => return None,
    };
    Some(meta)
}

fn modifier(flag: ElementFlag, words: &[&str]) -> MetaLine<'static> {
    if words.is_empty() {
        MetaLine::Modifier(flag)
    } else {
        MetaLine::Malformed(format!("{flag:?} modifier takes no arguments"))
    }
}

/// Body `BFC` statements. Certification lines are header properties and yield `None` here.
fn bfc(words: &[&str]) -> Option<MetaLine<'static>> {
    let meta = match words {
        ["CERTIFY", ..] | ["NOCERTIFY", ..] => return None,
        ["INVERTNEXT"] => MetaLine::InvertNext,
        ["CW"] => MetaLine::Bfc(BfcCommand::Winding(Winding::Cw)),
        ["CCW"] => MetaLine::Bfc(BfcCommand::Winding(Winding::Ccw)),
        ["CLIP"] => MetaLine::Bfc(BfcCommand::Clip(None)),
        ["CLIP", "CW"] | ["CW", "CLIP"] => MetaLine::Bfc(BfcCommand::Clip(Some(Winding::Cw))),
        ["CLIP", "CCW"] | ["CCW", "CLIP"] => MetaLine::Bfc(BfcCommand::Clip(Some(Winding::Ccw))),
        ["NOCLIP"] => MetaLine::Bfc(BfcCommand::NoClip),
        _ => MetaLine::Malformed(format!("unrecognised BFC statement '{}'", words.join(" "))),
    };
    Some(meta)
}
