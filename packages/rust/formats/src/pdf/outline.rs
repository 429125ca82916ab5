//! Document outline (bookmarks) → flat `(level, title, page)` list.

use std::collections::{HashMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use super::PdfTocEntry;
use super::object::{as_dict, get, resolve, text_of};

/// Walk the outline tree pre-order. Entries whose destination cannot be
/// mapped to a page of this document are left out.
pub(super) fn read_outline(doc: &Document, page_numbers: &HashMap<ObjectId, u32>) -> Vec<PdfTocEntry> {
    let mut out = Vec::new();
    let Ok(catalog) = doc.catalog() else {
        return out;
    };
    let Some(outlines) = get(doc, catalog, b"Outlines").and_then(as_dict) else {
        return out;
    };

    let mut seen = HashSet::new();
    walk(doc, catalog, first_child(outlines), 1, page_numbers, &mut seen, &mut out);
    out
}

fn first_child(dict: &Dictionary) -> Option<ObjectId> {
    match dict.get(b"First") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    }
}

fn walk(
    doc: &Document,
    catalog: &Dictionary,
    first: Option<ObjectId>,
    level: u32,
    page_numbers: &HashMap<ObjectId, u32>,
    seen: &mut HashSet<ObjectId>,
    out: &mut Vec<PdfTocEntry>,
) {
    let mut cursor = first;
    while let Some(id) = cursor {
        if !seen.insert(id) {
            break;
        }
        let Ok(item) = doc.get_dictionary(id) else {
            break;
        };

        let title = get(doc, item, b"Title")
            .and_then(text_of)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        match item_page(doc, catalog, item, page_numbers) {
            Some(page) => out.push(PdfTocEntry { level, title, page }),
            None => debug!(%title, "outline entry has no resolvable page"),
        }

        walk(doc, catalog, first_child(item), level + 1, page_numbers, seen, out);

        cursor = match item.get(b"Next") {
            Ok(Object::Reference(next)) => Some(*next),
            _ => None,
        };
    }
}

/// Page of an outline item, from `/Dest` or a `/GoTo` action's `/D`.
fn item_page(
    doc: &Document,
    catalog: &Dictionary,
    item: &Dictionary,
    page_numbers: &HashMap<ObjectId, u32>,
) -> Option<u32> {
    let dest = match get(doc, item, b"Dest") {
        Some(dest) => dest,
        None => {
            let action = get(doc, item, b"A").and_then(as_dict)?;
            get(doc, action, b"D")?
        }
    };
    dest_page(doc, catalog, dest, page_numbers, 0)
}

fn dest_page(
    doc: &Document,
    catalog: &Dictionary,
    dest: &Object,
    page_numbers: &HashMap<ObjectId, u32>,
    depth: u8,
) -> Option<u32> {
    if depth > 4 {
        return None;
    }
    match resolve(doc, dest) {
        Object::Array(items) => match items.first()? {
            Object::Reference(page_id) => page_numbers.get(page_id).copied(),
            Object::Integer(index) => u32::try_from(*index).ok().map(|i| i + 1),
            _ => None,
        },
        Object::Dictionary(dict) => {
            let inner = get(doc, dict, b"D")?;
            dest_page(doc, catalog, inner, page_numbers, depth + 1)
        }
        Object::Name(name) => {
            let dests = get(doc, catalog, b"Dests").and_then(as_dict)?;
            let target = get(doc, dests, name)?;
            dest_page(doc, catalog, target, page_numbers, depth + 1)
        }
        Object::String(key, _) => {
            let names = get(doc, catalog, b"Names").and_then(as_dict)?;
            let tree = get(doc, names, b"Dests").and_then(as_dict)?;
            let target = name_tree_lookup(doc, tree, key, 0)?;
            dest_page(doc, catalog, target, page_numbers, depth + 1)
        }
        _ => None,
    }
}

/// Look `key` up in a name tree (`/Names` leaf pairs, `/Kids` interior nodes).
fn name_tree_lookup<'a>(doc: &'a Document, node: &'a Dictionary, key: &[u8], depth: u8) -> Option<&'a Object> {
    if depth > 16 {
        return None;
    }
    if let Some(Object::Array(pairs)) = get(doc, node, b"Names") {
        for pair in pairs.chunks_exact(2) {
            if let Object::String(name, _) = resolve(doc, &pair[0]) {
                if name.as_slice() == key {
                    return Some(resolve(doc, &pair[1]));
                }
            }
        }
    }
    if let Some(Object::Array(kids)) = get(doc, node, b"Kids") {
        for kid in kids {
            if let Some(kid) = as_dict(resolve(doc, kid)) {
                if let Some(found) = name_tree_lookup(doc, kid, key, depth + 1) {
                    return Some(found);
                }
            }
        }
    }
    None
}
