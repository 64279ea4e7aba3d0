//! Page concatenation
//!
//! The combine step is exposed as an incremental [`Combiner`]: sources are appended
//! one at a time, so callers can report progress and stop between documents.
//! [`CombineBackend`] creates a fresh combiner per merge and is the seam where
//! callers substitute their own implementation.

mod copy;

pub use copy::{CopyCache, copy_object_deep, import_page, reserve_pages};

use crate::types::*;
use lopdf::{Dictionary, Document, Object, ObjectId};

/// One in-progress merge
pub trait Combiner: Send {
    /// Append every page of the PDF in `source`, returning the number of pages added.
    fn append(&mut self, source: &[u8]) -> Result<usize>;

    /// Serialise the combined document.
    fn finish(self: Box<Self>) -> Result<Vec<u8>>;
}

/// Factory for [`Combiner`]s
pub trait CombineBackend: Send + Sync {
    fn start(&self) -> Box<dyn Combiner>;
}

/// Combine backend built on lopdf
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfBackend;

impl CombineBackend for LopdfBackend {
    fn start(&self) -> Box<dyn Combiner> {
        Box::new(LopdfCombiner::new())
    }
}

/// Accumulates pages from several documents under a single flat page tree
pub struct LopdfCombiner {
    output: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl LopdfCombiner {
    pub fn new() -> Self {
        let mut output = Document::with_version("1.7");
        let pages_id = output.new_object_id();
        Self {
            output,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append every page of an already-parsed document
    pub fn append_document(&mut self, source: &Document) -> Result<usize> {
        if source.is_encrypted() {
            return Err(MergeError::Encrypted);
        }

        let page_ids: Vec<ObjectId> = source.get_pages().values().copied().collect();
        let mut cache = CopyCache::new();
        reserve_pages(&mut self.output, &page_ids, &mut cache);

        for page_id in &page_ids {
            let new_id = import_page(
                &mut self.output,
                source,
                *page_id,
                self.pages_id,
                &mut cache,
            )?;
            self.kids.push(Object::Reference(new_id));
        }

        Ok(page_ids.len())
    }

    /// Close the page tree and return the combined document
    pub fn into_document(mut self) -> Result<Document> {
        if self.kids.is_empty() {
            return Err(MergeError::NoPages);
        }

        let count = self.kids.len() as i64;
        let pages_dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(self.kids)),
            ("Count", Object::Integer(count)),
        ]);
        self.output
            .objects
            .insert(self.pages_id, Object::Dictionary(pages_dict));

        let catalog_id = self.output.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]));
        self.output.trailer.set("Root", catalog_id);

        Ok(self.output)
    }
}

impl Default for LopdfCombiner {
    fn default() -> Self {
        Self::new()
    }
}

impl Combiner for LopdfCombiner {
    fn append(&mut self, source: &[u8]) -> Result<usize> {
        let document = Document::load_mem(source)?;
        self.append_document(&document)
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        let mut document = self.into_document()?;
        let mut writer = Vec::new();
        document.save_to(&mut writer)?;
        Ok(writer)
    }
}

/// Merge already-loaded documents in order
pub fn merge_documents(documents: &[Document]) -> Result<Document> {
    let mut combiner = LopdfCombiner::new();
    for document in documents {
        combiner.append_document(document)?;
    }
    combiner.into_document()
}
