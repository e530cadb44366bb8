use anyhow::{Context, Result, bail};
use lopdf::Object;

use crate::pdf::{PdfDocument, RawOutlineEntry, decode_pdf_string};

/// Normalize an outline entry's destination information to a 0-based page
/// index. Checks the explicit destination first, then the GoTo action.
/// Errors here are collected as build diagnostics, never propagated.
pub(super) fn resolve_entry_page(doc: &PdfDocument, entry: &RawOutlineEntry) -> Result<usize> {
    if let Some(dest) = &entry.dest {
        return dest_to_page(doc, dest);
    }
    if let Some(action) = &entry.action {
        return action_to_page(doc, action);
    }
    bail!("entry carries neither a destination nor an action")
}

fn action_to_page(doc: &PdfDocument, action: &Object) -> Result<usize> {
    let action = doc.resolve_once(action)?;
    let Object::Dictionary(dict) = action else {
        bail!("action is not a dictionary");
    };

    match dict.get(b"S") {
        Ok(Object::Name(kind)) if kind.as_slice() == b"GoTo" => {}
        _ => bail!("action is not a GoTo action"),
    }

    let dest = dict.get(b"D").context("GoTo action has no destination")?;
    dest_to_page(doc, dest)
}

/// Resolve a destination value of any of its three shapes: a direct array,
/// a named destination (string or symbolic name), or an indirect reference.
/// At most one level of indirection is followed per stage.
fn dest_to_page(doc: &PdfDocument, dest: &Object) -> Result<usize> {
    let named;
    let dest = match dest {
        Object::String(bytes, _) | Object::Name(bytes) => {
            named = doc.named_destination(&decode_pdf_string(bytes))?;
            &named
        }
        other => doc.resolve_once(other)?,
    };

    // A destination may be a dictionary wrapping the array under /D.
    let dest = match dest {
        Object::Dictionary(dict) => dict.get(b"D").context("destination dictionary has no /D")?,
        other => other,
    };

    match dest {
        Object::Array(parts) => {
            let first = parts.first().context("destination array is empty")?;
            match first {
                Object::Reference(page_id) => doc
                    .page_index(*page_id)
                    .context("destination page is not in the page tree"),
                _ => bail!("destination array does not start with a page reference"),
            }
        }
        Object::Reference(_) => bail!("destination requires deeper indirection than supported"),
        _ => bail!("unsupported destination shape"),
    }
}
