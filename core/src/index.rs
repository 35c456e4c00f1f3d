use anyhow::Result;
use std::collections::HashMap;
use std::fs;

use crate::persist::{
    save_dictionary, save_doc_id_map, save_docs, save_meta, save_postings_for_term, IndexPaths, MetaFile,
    FORMAT_VERSION,
};
use crate::tokenizer::tokenize;
use crate::{DocId, DocMeta, Posting, TermId};

/// One page as handed to the index by the corpus pass.
pub struct IndexDocument<'a> {
    pub doc_id: DocId,
    pub external_id: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub url: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexSummary {
    pub num_docs: u32,
    pub num_terms: usize,
}

pub struct IndexBuilder {
    paths: IndexPaths,
    base_url: String,
    next_term_id: TermId,
    dictionary: HashMap<String, TermId>,
    df: Vec<u32>,
    postings: HashMap<TermId, Vec<Posting>>,
    docs: HashMap<DocId, DocMeta>,
    doc_id_map: HashMap<String, DocId>,
    title_tokens: u64,
    text_tokens: u64,
}

impl IndexBuilder {
    pub fn create(paths: IndexPaths, base_url: &str) -> Result<Self> {
        fs::create_dir_all(&paths.root)?;
        fs::create_dir_all(paths.texts_dir())?;
        Ok(Self {
            paths,
            base_url: base_url.to_string(),
            next_term_id: 0,
            dictionary: HashMap::new(),
            df: Vec::new(),
            postings: HashMap::new(),
            docs: HashMap::new(),
            doc_id_map: HashMap::new(),
            title_tokens: 0,
            text_tokens: 0,
        })
    }

    fn term_id(&mut self, term: String) -> TermId {
        let next = &mut self.next_term_id;
        let df = &mut self.df;
        *self.dictionary.entry(term).or_insert_with(|| {
            let id = *next;
            *next += 1;
            df.push(0);
            id
        })
    }

    pub fn add_document(&mut self, doc: IndexDocument<'_>) -> Result<()> {
        let title_terms = tokenize(doc.title);
        let text_terms = tokenize(doc.body);

        // (title_tf, text_tf) per term
        let mut counts: HashMap<TermId, (u32, u32)> = HashMap::new();
        for (term, _pos) in &title_terms {
            let tid = self.term_id(term.clone());
            counts.entry(tid).or_default().0 += 1;
        }
        for (term, _pos) in &text_terms {
            let tid = self.term_id(term.clone());
            counts.entry(tid).or_default().1 += 1;
        }
        for (tid, (title_tf, text_tf)) in counts {
            self.df[tid as usize] += 1;
            self.postings.entry(tid).or_default().push(Posting { doc_id: doc.doc_id, title_tf, text_tf });
        }

        // Write text for snippet extraction
        let text_rel = format!("texts/{}.txt", doc.doc_id);
        fs::write(self.paths.root.join(&text_rel), doc.body)?;

        self.title_tokens += title_terms.len() as u64;
        self.text_tokens += text_terms.len() as u64;
        self.doc_id_map.insert(doc.external_id.to_string(), doc.doc_id);
        self.docs.insert(
            doc.doc_id,
            DocMeta {
                external_id: doc.external_id.to_string(),
                title: doc.title.to_string(),
                url: doc.url.map(str::to_string),
                text_path: Some(text_rel),
                title_len: title_terms.len() as u32,
                text_len: text_terms.len() as u32,
            },
        );
        Ok(())
    }

    /// Persists postings (sorted by doc id), dictionary, docs, doc-id map and meta.
    pub fn finish(self) -> Result<IndexSummary> {
        let num_docs = self.docs.len() as u32;
        for (term_id, mut plist) in self.postings {
            plist.sort_by_key(|p| p.doc_id);
            save_postings_for_term(&self.paths, term_id, &plist)?;
        }
        let num_terms = self.dictionary.len();
        save_dictionary(&self.paths, &(self.dictionary, self.df))?;
        save_docs(&self.paths, &self.docs)?;
        save_doc_id_map(&self.paths, &self.doc_id_map)?;

        let n = num_docs.max(1) as f32;
        let meta = MetaFile {
            num_docs,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            version: FORMAT_VERSION,
            avg_title_len: self.title_tokens as f32 / n,
            avg_text_len: self.text_tokens as f32 / n,
            base_url: self.base_url,
        };
        save_meta(&self.paths, &meta)?;
        tracing::info!(num_docs, num_terms, "index persisted");
        Ok(IndexSummary { num_docs, num_terms })
    }
}
