//! Object model of the reference engine
//!
//! Content-addressed Blob, Tree and Commit objects. An object id is the SHA-1
//! of the framed form `"<kind> <len>\0<payload>"`. Blob payloads are the raw
//! file bytes; tree and commit payloads are bincode.

use std::collections::BTreeMap;
use std::fmt;

use histkit_core::engine::{Author, CommitData, EngineError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

/// Unique identifier of a stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Id of an already framed object
    pub fn from_framed(data: &[u8]) -> Self {
        let hash = Sha1::digest(data);
        Self(hash.into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 20 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Parse an id coming from a ref, an option or the wire
    pub fn parse(value: &str) -> Result<Self> {
        Self::from_hex(value.trim())
            .map_err(|e| EngineError::Corrupt(format!("Invalid object id '{}': {}", value, e)))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// Ids travel as hex strings in JSON files and bincode payloads alike.
impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ObjectId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Object type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "blob" => Some(ObjectKind::Blob),
            "tree" => Some(ObjectKind::Tree),
            "commit" => Some(ObjectKind::Commit),
            _ => None,
        }
    }
}

/// Regular file entry of a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub id: ObjectId,
    /// Unix mode
    pub mode: u32,
}

/// Snapshot of the working tree.
///
/// Trees are flat: keys are full workspace-relative paths, sorted for
/// deterministic hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: TreeEntry) {
        self.entries.insert(path.into(), entry);
    }

    pub fn get(&self, path: &str) -> Option<&TreeEntry> {
        self.entries.get(path)
    }
}

/// Identity and time of an author or committer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Unix seconds
    pub timestamp: i64,
    /// Timezone offset in minutes
    pub tz_offset: i32,
}

impl Signature {
    pub fn now(author: &Author) -> Self {
        Self {
            name: author.name.clone(),
            email: author.email.clone(),
            timestamp: chrono::Utc::now().timestamp(),
            tz_offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tree: ObjectId,
    /// Empty for a root commit
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Always ends with a newline
    pub message: String,
}

impl Commit {
    pub fn new(tree: ObjectId, parents: Vec<ObjectId>, author: Signature, message: &str) -> Self {
        let mut message = message.to_string();
        if !message.ends_with('\n') {
            message.push('\n');
        }
        Self {
            tree,
            parents,
            committer: author.clone(),
            author,
            message,
        }
    }

    /// Shape returned to the workflow layer
    pub fn to_data(&self) -> CommitData {
        CommitData {
            message: self.message.clone(),
            tree: self.tree.to_hex(),
            parent: self.parents.iter().map(ObjectId::to_hex).collect(),
            author: Author {
                name: self.author.name.clone(),
                email: self.author.email.clone(),
            },
            timestamp: self.author.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Vec<u8>),
    Tree(Tree),
    Commit(Commit),
}

fn corrupt(e: impl fmt::Display) -> EngineError {
    EngineError::Corrupt(e.to_string())
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Blob(_) => ObjectKind::Blob,
            Object::Tree(_) => ObjectKind::Tree,
            Object::Commit(_) => ObjectKind::Commit,
        }
    }

    fn payload(&self) -> Result<Vec<u8>> {
        match self {
            Object::Blob(data) => Ok(data.clone()),
            Object::Tree(tree) => bincode::serialize(tree).map_err(corrupt),
            Object::Commit(commit) => bincode::serialize(commit).map_err(corrupt),
        }
    }

    /// `"<kind> <len>\0<payload>"`
    pub fn frame(&self) -> Result<Vec<u8>> {
        let payload = self.payload()?;
        let mut framed = format!("{} {}\0", self.kind().as_str(), payload.len()).into_bytes();
        framed.extend_from_slice(&payload);
        Ok(framed)
    }

    /// Parse a framed object, checking the declared length
    pub fn unframe(data: &[u8]) -> Result<Self> {
        let nul = data
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| corrupt("missing object header"))?;
        let header = std::str::from_utf8(&data[..nul]).map_err(corrupt)?;
        let (kind, len) = header
            .split_once(' ')
            .ok_or_else(|| corrupt(format!("malformed object header '{}'", header)))?;
        let kind = ObjectKind::parse(kind)
            .ok_or_else(|| corrupt(format!("unknown object kind '{}'", kind)))?;
        let len: usize = len.parse().map_err(corrupt)?;
        let payload = &data[nul + 1..];
        if payload.len() != len {
            return Err(corrupt(format!(
                "object length mismatch: header says {}, found {}",
                len,
                payload.len()
            )));
        }
        match kind {
            ObjectKind::Blob => Ok(Object::Blob(payload.to_vec())),
            ObjectKind::Tree => Ok(Object::Tree(bincode::deserialize(payload).map_err(corrupt)?)),
            ObjectKind::Commit => Ok(Object::Commit(
                bincode::deserialize(payload).map_err(corrupt)?,
            )),
        }
    }

    pub fn id(&self) -> Result<ObjectId> {
        Ok(ObjectId::from_framed(&self.frame()?))
    }
}

/// Id a blob with the given content would have
pub fn blob_id(data: &[u8]) -> ObjectId {
    let mut framed = format!("blob {}\0", data.len()).into_bytes();
    framed.extend_from_slice(data);
    ObjectId::from_framed(&framed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature() -> Signature {
        Signature {
            name: "JohnSmith".into(),
            email: "john.smith@foo.bar".into(),
            timestamp: 1_700_000_000,
            tz_offset: 0,
        }
    }

    #[test]
    fn test_blob_id_matches_git() {
        // `git hash-object` of "hello world\n"
        assert_eq!(
            blob_id(b"hello world\n").to_hex(),
            "3b18e512dba79e4c8300dd08aeb37f8e728b8dad"
        );
        assert_eq!(
            Object::Blob(b"hello world\n".to_vec()).id().unwrap(),
            blob_id(b"hello world\n")
        );
    }

    #[test]
    fn test_object_id_hex() {
        let id = blob_id(b"");
        assert_eq!(ObjectId::from_hex(&id.to_hex()).unwrap(), id);
        assert!(ObjectId::from_hex("abcd").is_err());
        assert!(ObjectId::parse("not hex").is_err());
    }

    #[test]
    fn test_commit_message_normalized() {
        let commit = Commit::new(blob_id(b""), vec![], signature(), "abc.md\nefg.md");
        assert_eq!(commit.message, "abc.md\nefg.md\n");
        let data = commit.to_data();
        assert_eq!(data.author.name, "JohnSmith");
        assert!(data.parent.is_empty());
    }

    #[test]
    fn test_unframe_rejects_bad_length() {
        let mut framed = Object::Blob(b"abc".to_vec()).frame().unwrap();
        framed.push(b'x');
        assert!(matches!(Object::unframe(&framed), Err(EngineError::Corrupt(_))));
    }

    #[test]
    fn test_tree_frame() {
        let mut tree = Tree::new();
        tree.insert(
            "docs/abc.md",
            TreeEntry {
                id: blob_id(b"abc"),
                mode: 0o100644,
            },
        );
        let framed = Object::Tree(tree.clone()).frame().unwrap();
        assert_eq!(Object::unframe(&framed).unwrap(), Object::Tree(tree));
    }
}
