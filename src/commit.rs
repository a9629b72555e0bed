//! Commit identifiers and raw commit objects.

use std::fmt;

/// A full hexadecimal object id (SHA-1 or SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(String);

impl CommitId {
    /// Parse a full object id, as printed by `git rev-parse`.
    ///
    /// Abbreviated ids are rejected; resolve those through the repository first.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let full_length = text.len() == 40 || text.len() == 64;
        let lower_hex = text.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if full_length && lower_hex {
            Some(Self(text.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first eight hex digits, for display.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Headers dropped when a commit is re-written with new parents.
///
/// A signature covers the parent lines, so it cannot survive a re-parent.
const SIGNATURE_HEADERS: &[&str] = &["gpgsig", "gpgsig-sha256"];

/// Read-only view of a commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub id: CommitId,
    pub tree: String,
    pub parents: Vec<CommitId>,
    /// Raw author line value: `Name <email> timestamp tz`, in the commit's own encoding.
    pub author: Vec<u8>,
    /// Raw committer line value.
    pub committer: Vec<u8>,
    /// Any other headers (`encoding`, `mergetag`, signatures), verbatim and in order.
    pub extra_headers: Vec<Header>,
    /// Message bytes exactly as stored.
    pub message: Vec<u8>,
}

/// A header that is carried through unchanged, continuation lines included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    /// Everything after `key `, including embedded `\n ` continuations.
    pub value: Vec<u8>,
}

/// A commit object that could not be understood.
#[derive(Debug, thiserror::Error)]
#[error("malformed commit {id}: {reason}")]
pub struct ParseError {
    pub id: String,
    pub reason: String,
}

impl CommitRecord {
    /// Parse the body of a commit object as printed by `git cat-file commit`.
    pub fn parse(id: CommitId, raw: &[u8]) -> Result<Self, ParseError> {
        let fail = |reason: &str| ParseError {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let (header_bytes, message) = match find(raw, b"\n\n") {
            Some(pos) => (&raw[..pos], raw[pos + 2..].to_vec()),
            None => (raw.strip_suffix(b"\n").unwrap_or(raw), Vec::new()),
        };

        let mut headers: Vec<Header> = Vec::new();
        for line in header_bytes.split(|&b| b == b'\n') {
            if let Some(rest) = line.strip_prefix(b" ") {
                let last = headers
                    .last_mut()
                    .ok_or_else(|| fail("continuation line before any header"))?;
                last.value.extend_from_slice(b"\n ");
                last.value.extend_from_slice(rest);
                continue;
            }
            let split = line.iter().position(|&b| b == b' ').unwrap_or(line.len());
            let key = String::from_utf8_lossy(&line[..split]).into_owned();
            let value = line.get(split + 1..).unwrap_or_default().to_vec();
            headers.push(Header { key, value });
        }

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut extra_headers = Vec::new();
        for header in headers {
            match header.key.as_str() {
                "tree" => tree = Some(lossy(&header.value)),
                "parent" => {
                    let parent = CommitId::parse(&lossy(&header.value))
                        .ok_or_else(|| fail("bad parent id"))?;
                    parents.push(parent);
                }
                "author" => author = Some(header.value),
                "committer" => committer = Some(header.value),
                _ => extra_headers.push(header),
            }
        }

        let tree = tree.ok_or_else(|| fail("missing tree header"))?;
        let author = author.ok_or_else(|| fail("missing author header"))?;
        let committer = committer.ok_or_else(|| fail("missing committer header"))?;

        Ok(Self {
            id,
            tree,
            author,
            committer,
            parents,
            extra_headers,
            message,
        })
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message, for display.
    pub fn summary(&self) -> String {
        let message = String::from_utf8_lossy(&self.message);
        message.lines().next().unwrap_or_default().to_string()
    }

    /// Serialize this commit with a different parent list.
    ///
    /// Tree, author, committer and message are emitted verbatim. Signature
    /// headers are dropped.
    pub fn encode_with_parents(&self, parents: &[CommitId]) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.message.len());
        out.extend_from_slice(format!("tree {}\n", self.tree).as_bytes());
        for parent in parents {
            out.extend_from_slice(format!("parent {parent}\n").as_bytes());
        }
        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author);
        out.extend_from_slice(b"\ncommitter ");
        out.extend_from_slice(&self.committer);
        out.push(b'\n');
        for header in &self.extra_headers {
            if SIGNATURE_HEADERS.contains(&header.key.as_str()) {
                continue;
            }
            out.extend_from_slice(header.key.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&header.value);
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "1111111111111111111111111111111111111111";
    const B: &str = "2222222222222222222222222222222222222222";
    const TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    fn id(s: &str) -> CommitId {
        CommitId::parse(s).unwrap()
    }

    #[test]
    fn commit_id_requires_full_hex() {
        assert!(CommitId::parse(A).is_some());
        assert!(CommitId::parse(&"ab".repeat(32)).is_some());
        assert!(CommitId::parse("1111111").is_none());
        assert!(CommitId::parse(&"G".repeat(40)).is_none());
        assert!(CommitId::parse(&"A".repeat(40)).is_none());
        assert_eq!(CommitId::parse(&format!("{A}\n")).unwrap().as_str(), A);
    }

    #[test]
    fn parses_plain_commit() {
        let raw = format!(
            "tree {TREE}\nparent {A}\nauthor Ann <ann@example.com> 1700000000 +0100\n\
             committer Bob <bob@example.com> 1700000100 -0500\n\nSubject line\n\nBody\n"
        );
        let record = CommitRecord::parse(id(B), raw.as_bytes()).unwrap();
        assert_eq!(record.tree, TREE);
        assert_eq!(record.parents, vec![id(A)]);
        assert_eq!(record.author, b"Ann <ann@example.com> 1700000000 +0100");
        assert_eq!(record.committer, b"Bob <bob@example.com> 1700000100 -0500");
        assert_eq!(record.message, b"Subject line\n\nBody\n");
        assert_eq!(record.summary(), "Subject line");
        assert!(!record.is_merge());
        assert_eq!(record.encode_with_parents(&record.parents), raw.as_bytes());
    }

    #[test]
    fn re_encoding_swaps_parents_and_drops_signature() {
        let raw = format!(
            "tree {TREE}\nparent {A}\nparent {B}\nauthor A <a@x> 1 +0000\ncommitter A <a@x> 1 +0000\n\
             encoding ISO-8859-1\ngpgsig -----BEGIN PGP SIGNATURE-----\n \n abcdef\n -----END PGP SIGNATURE-----\n\nmerge\n"
        );
        let record = CommitRecord::parse(id(B), raw.as_bytes()).unwrap();
        assert!(record.is_merge());
        assert_eq!(record.extra_headers.len(), 2);
        assert_eq!(
            record.extra_headers[1].value,
            b"-----BEGIN PGP SIGNATURE-----\n \n abcdef\n -----END PGP SIGNATURE-----"
        );

        let encoded = record.encode_with_parents(&[id(A)]);
        let expected = format!(
            "tree {TREE}\nparent {A}\nauthor A <a@x> 1 +0000\ncommitter A <a@x> 1 +0000\n\
             encoding ISO-8859-1\n\nmerge\n"
        );
        assert_eq!(String::from_utf8(encoded).unwrap(), expected);

        let root = record.encode_with_parents(&[]);
        assert!(!String::from_utf8(root).unwrap().contains("parent "));
    }

    #[test]
    fn latin1_identity_bytes_survive_re_encoding() {
        let tree_line = format!("tree {TREE}\n").into_bytes();
        let parent_line = format!("parent {A}\n").into_bytes();
        let rest: &[u8] = b"author Ren\xE9 <r@x> 1 +0000\ncommitter Fran\xE7ois <f@x> 2 +0000\n\
                            encoding ISO-8859-1\n\ncaf\xE9\n";
        let raw = [tree_line.as_slice(), &parent_line, rest].concat();

        let record = CommitRecord::parse(id(B), &raw).unwrap();
        assert_eq!(record.author, b"Ren\xE9 <r@x> 1 +0000");
        assert_eq!(record.committer, b"Fran\xE7ois <f@x> 2 +0000");

        let encoded = record.encode_with_parents(&[]);
        assert_eq!(encoded, [tree_line.as_slice(), rest].concat());
    }

    #[test]
    fn headers_without_message_have_no_empty_header() {
        let raw = format!("tree {TREE}\nauthor A <a@x> 1 +0000\ncommitter A <a@x> 1 +0000\n");
        let record = CommitRecord::parse(id(A), raw.as_bytes()).unwrap();
        assert!(record.extra_headers.is_empty());
        assert!(record.message.is_empty());

        let encoded = String::from_utf8(record.encode_with_parents(&[])).unwrap();
        assert_eq!(encoded, format!("{raw}\n"));
        assert!(!encoded.contains("\n \n"));
    }

    #[test]
    fn missing_tree_is_an_error() {
        let raw = b"author A <a@x> 1 +0000\ncommitter A <a@x> 1 +0000\n\nmsg\n";
        let err = CommitRecord::parse(id(A), raw).unwrap_err();
        assert!(err.to_string().contains("missing tree"));
    }
}
