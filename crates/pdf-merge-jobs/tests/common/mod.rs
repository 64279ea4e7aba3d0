#![allow(dead_code)]

use lopdf::{Dictionary, Document, Object, Stream};
use pdf_merge_jobs::*;
use std::sync::Arc;

pub fn create_test_pdf(num_pages: usize, width: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");

    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for _ in 0..num_pages {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), b"q Q".to_vec()));

        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(792),
                ]),
            ),
            ("Resources", Object::Dictionary(Dictionary::new())),
            ("Contents", Object::Reference(content_id)),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(num_pages as i64)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));

    doc.trailer.set("Root", catalog_id);

    let mut writer = Vec::new();
    doc.save_to(&mut writer).unwrap();
    writer
}

pub fn pdf_file(name: &str, num_pages: usize, width: i64) -> UploadedFile {
    UploadedFile::new(name, create_test_pdf(num_pages, width))
}

pub fn corrupt_file(name: &str) -> UploadedFile {
    let bytes = create_test_pdf(2, 612);
    UploadedFile::new(name, bytes[..40].to_vec())
}

pub fn page_widths(bytes: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            media_box[2].as_i64().unwrap()
        })
        .collect()
}

/// Start a merge and wait for the job to reach a terminal state, returning every
/// status published for it along the way
pub async fn merge_and_wait(store: &Arc<JobStore>, id: JobId, name: &str) -> Vec<JobStatus> {
    let mut events = store.subscribe();
    store.start_merge(id, name).unwrap();

    let mut seen = Vec::new();
    loop {
        let event = events.recv().await.unwrap();
        if event.job_id != id {
            continue;
        }
        let terminal = event.status.is_terminal();
        seen.push(event.status);
        if terminal {
            return seen;
        }
    }
}
