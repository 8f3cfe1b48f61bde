//! File status codes
//!
//! A status compares the three versions of a path: the committed one
//! (HEAD), the staged one (index) and the one in the working directory.
//! Codes starting with `*` mark differences between the working directory
//! and the index, which is what a save picks up.

use crate::object::ObjectId;

pub const IGNORED: &str = "ignored";

/// Status code of a path given its blob id in HEAD, the index and the
/// working directory.
pub fn status_code(
    head: Option<&ObjectId>,
    index: Option<&ObjectId>,
    workdir: Option<&ObjectId>,
) -> &'static str {
    match (head, index, workdir) {
        (None, None, None) => "absent",
        (None, None, Some(_)) => "*added",
        (None, Some(_), None) => "*absent",
        (None, Some(i), Some(w)) => {
            if i == w {
                "added"
            } else {
                "*added"
            }
        }
        (Some(_), None, None) => "deleted",
        (Some(h), None, Some(w)) => {
            if h == w {
                "*undeleted"
            } else {
                "*undeletemodified"
            }
        }
        (Some(_), Some(_), None) => "*deleted",
        (Some(h), Some(i), Some(w)) => match (h == i, i == w) {
            (true, true) => "unmodified",
            (true, false) => "*modified",
            (false, true) => "modified",
            (false, false) if h == w => "*unmodified",
            (false, false) => "*modified",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::blob_id;

    #[test]
    fn test_status_matrix() {
        let a = blob_id(b"a");
        let b = blob_id(b"b");
        let c = blob_id(b"c");
        let cases = [
            (None, None, None, "absent"),
            (None, None, Some(&a), "*added"),
            (None, Some(&a), None, "*absent"),
            (None, Some(&a), Some(&a), "added"),
            (None, Some(&a), Some(&b), "*added"),
            (Some(&a), None, None, "deleted"),
            (Some(&a), None, Some(&a), "*undeleted"),
            (Some(&a), None, Some(&b), "*undeletemodified"),
            (Some(&a), Some(&a), None, "*deleted"),
            (Some(&a), Some(&b), None, "*deleted"),
            (Some(&a), Some(&a), Some(&a), "unmodified"),
            (Some(&a), Some(&a), Some(&b), "*modified"),
            (Some(&a), Some(&b), Some(&b), "modified"),
            (Some(&a), Some(&b), Some(&a), "*unmodified"),
            (Some(&a), Some(&b), Some(&c), "*modified"),
        ];
        for (head, index, workdir, expected) in cases {
            assert_eq!(status_code(head, index, workdir), expected);
        }
    }
}
