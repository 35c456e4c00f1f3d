use crate::graph::{LinkGraph, TitleTable};
use crate::pagerank::RankTable;
use crate::{DocId, DocMeta, Error, Posting, TermId};
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub created_at: String,
    pub version: u32,
    #[serde(default)]
    pub avg_title_len: f32,
    #[serde(default)]
    pub avg_text_len: f32,
    /// Prefix used to derive a page link from its title when the corpus gives none.
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn dictionary(&self) -> PathBuf { self.root.join("dictionary.bin") }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn postings_dir(&self) -> PathBuf { self.root.join("postings") }
    fn doc_id_map(&self) -> PathBuf { self.root.join("doc_id_map.bin") }
    fn titles(&self) -> PathBuf { self.root.join("titles.bin") }
    fn graph(&self) -> PathBuf { self.root.join("graph.bin") }
    fn ranks(&self) -> PathBuf { self.root.join("pagerank.bin") }
    pub fn texts_dir(&self) -> PathBuf { self.root.join("texts") }
}

fn write_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let mut f = File::create(path)?;
    let bytes = bincode::serialize(value)?;
    f.write_all(&bytes)?;
    Ok(())
}

/// A missing file surfaces as [`Error::MissingArtifact`] so callers can report which one.
fn read_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::MissingArtifact(path.to_path_buf()).into()),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(bincode::deserialize(&buf)?)
}

pub fn save_dictionary(paths: &IndexPaths, dict: &(HashMap<String, TermId>, Vec<u32>)) -> Result<()> {
    write_bin(&paths.dictionary(), dict)
}

pub fn load_dictionary(paths: &IndexPaths) -> Result<(HashMap<String, TermId>, Vec<u32>)> {
    read_bin(&paths.dictionary())
}

pub fn save_docs(paths: &IndexPaths, docs: &HashMap<DocId, DocMeta>) -> Result<()> {
    write_bin(&paths.docs(), docs)
}

pub fn load_docs(paths: &IndexPaths) -> Result<HashMap<DocId, DocMeta>> {
    read_bin(&paths.docs())
}

pub fn save_postings_for_term(paths: &IndexPaths, term_id: TermId, postings: &[Posting]) -> Result<()> {
    write_bin(&paths.postings_dir().join(format!("{term_id:08}.postings.bin")), &postings)
}

pub fn load_postings_for_term(paths: &IndexPaths, term_id: TermId) -> Result<Vec<Posting>> {
    read_bin(&paths.postings_dir().join(format!("{term_id:08}.postings.bin")))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let path = paths.meta();
    if !path.exists() {
        return Err(Error::MissingArtifact(path).into());
    }
    let mut buf = String::new();
    File::open(&path)?.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub fn save_doc_id_map(paths: &IndexPaths, map: &HashMap<String, DocId>) -> Result<()> {
    write_bin(&paths.doc_id_map(), map)
}

pub fn load_doc_id_map(paths: &IndexPaths) -> Result<HashMap<String, DocId>> {
    read_bin(&paths.doc_id_map())
}

pub fn save_titles(paths: &IndexPaths, titles: &TitleTable) -> Result<()> {
    write_bin(&paths.titles(), titles)
}

pub fn load_titles(paths: &IndexPaths) -> Result<TitleTable> {
    read_bin(&paths.titles())
}

pub fn save_graph(paths: &IndexPaths, graph: &LinkGraph) -> Result<()> {
    write_bin(&paths.graph(), graph)
}

pub fn load_graph(paths: &IndexPaths) -> Result<LinkGraph> {
    read_bin(&paths.graph())
}

pub fn save_rank_table(paths: &IndexPaths, table: &RankTable) -> Result<()> {
    write_bin(&paths.ranks(), table)
}

pub fn load_rank_table(paths: &IndexPaths) -> Result<RankTable> {
    read_bin(&paths.ranks())
}

pub struct IndexHeader {
    pub dictionary: HashMap<String, TermId>,
    pub df: Vec<u32>,
    pub docs: HashMap<DocId, DocMeta>,
    pub meta: MetaFile,
}

/// Load only the header structures required to search: dictionary, df, docs, meta.
pub fn load_index_header(paths: &IndexPaths) -> Result<IndexHeader> {
    let (dictionary, df) = load_dictionary(paths)?;
    let docs = load_docs(paths)?;
    let meta = load_meta(paths)?;
    Ok(IndexHeader { dictionary, df, docs, meta })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_table_round_trips_and_missing_files_are_named() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let err = load_rank_table(&paths).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MissingArtifact(_))));

        let table = RankTable::from_scores(HashMap::from([(1, 0.25), (7, 0.75)]));
        save_rank_table(&paths, &table).unwrap();
        assert_eq!(load_rank_table(&paths).unwrap(), table);
    }
}
