//! Object transplanting between documents
//!
//! Pages are moved from a source document into the output by deep-copying every
//! object they reference. Object ids are reserved before recursing so that
//! reference cycles (annotations pointing back at their page, outlines, etc.)
//! terminate.

use crate::types::{DEFAULT_PAGE_DIMENSIONS, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against malformed page trees whose Parent links loop
const MAX_TREE_DEPTH: usize = 64;

/// Maps source object ids to their copies in the output document
pub type CopyCache = HashMap<ObjectId, ObjectId>;

/// Reserve output ids for every page of `source` up front.
///
/// Links and destinations frequently reference other pages; pre-seeding the cache
/// makes those references resolve to the imported pages instead of dragging a
/// second copy of the source page tree into the output.
pub fn reserve_pages(output: &mut Document, page_ids: &[ObjectId], cache: &mut CopyCache) {
    for page_id in page_ids {
        cache
            .entry(*page_id)
            .or_insert_with(|| output.new_object_id());
    }
}

/// Copy one page into `output`, re-parented under `parent_id`.
///
/// Inherited attributes are materialised on the copied page, since the source
/// page tree does not come along.
pub fn import_page(
    output: &mut Document,
    source: &Document,
    page_id: ObjectId,
    parent_id: ObjectId,
    cache: &mut CopyCache,
) -> Result<ObjectId> {
    let new_id = *cache
        .entry(page_id)
        .or_insert_with(|| output.new_object_id());
    let page = source.get_dictionary(page_id)?;

    let mut copied = Dictionary::new();
    for (key, value) in page.iter() {
        if key.as_slice() == b"Parent" {
            continue;
        }
        copied.set(key.clone(), copy_object_deep(output, source, value, cache)?);
    }

    for key in INHERITABLE_ATTRIBUTES {
        if copied.has(key) {
            continue;
        }
        if let Some(value) = inherited_attribute(source, page, key) {
            copied.set(key.to_vec(), copy_object_deep(output, source, &value, cache)?);
        }
    }

    if !copied.has(b"MediaBox") {
        copied.set("MediaBox", default_media_box());
    }
    if !copied.has(b"Resources") {
        copied.set("Resources", Object::Dictionary(Dictionary::new()));
    }
    copied.set("Parent", Object::Reference(parent_id));

    output.objects.insert(new_id, Object::Dictionary(copied));
    Ok(new_id)
}

/// Deep copy an object from source to output document, following references.
pub fn copy_object_deep(
    output: &mut Document,
    source: &Document,
    obj: &Object,
    cache: &mut CopyCache,
) -> Result<Object> {
    match obj {
        Object::Reference(id) => {
            if let Some(&new_id) = cache.get(id) {
                return Ok(Object::Reference(new_id));
            }

            let new_id = output.new_object_id();
            cache.insert(*id, new_id);

            // Dangling references are common in real-world files; keep them as null
            let copied = match source.get_object(*id) {
                Ok(referenced) => copy_object_deep(output, source, referenced, cache)?,
                Err(_) => {
                    log::debug!("Dangling reference {id:?} replaced with null");
                    Object::Null
                }
            };
            output.objects.insert(new_id, copied);

            Ok(Object::Reference(new_id))
        }
        Object::Dictionary(dict) => Ok(Object::Dictionary(copy_dictionary(
            output, source, dict, cache,
        )?)),
        Object::Array(arr) => {
            let new_arr: Result<Vec<_>> = arr
                .iter()
                .map(|item| copy_object_deep(output, source, item, cache))
                .collect();
            Ok(Object::Array(new_arr?))
        }
        Object::Stream(stream) => Ok(Object::Stream(Stream {
            dict: copy_dictionary(output, source, &stream.dict, cache)?,
            content: stream.content.clone(),
            allows_compression: stream.allows_compression,
            start_position: None,
        })),
        _ => Ok(obj.clone()),
    }
}

fn copy_dictionary(
    output: &mut Document,
    source: &Document,
    dict: &Dictionary,
    cache: &mut CopyCache,
) -> Result<Dictionary> {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        new_dict.set(key.clone(), copy_object_deep(output, source, value, cache)?);
    }
    Ok(new_dict)
}

fn inherited_attribute(source: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    for _ in 0..MAX_TREE_DEPTH {
        let node = source.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    None
}

fn default_media_box() -> Object {
    Object::Array(vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Integer(DEFAULT_PAGE_DIMENSIONS.0),
        Object::Integer(DEFAULT_PAGE_DIMENSIONS.1),
    ])
}
