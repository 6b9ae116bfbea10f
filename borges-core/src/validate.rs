//! Cheap structural validation for identifiers this crate mints itself, as distinct
//! from `git-validate`'s validation of actual Git reference names (used directly in
//! [`crate::refs`]).

use quick_error::quick_error;

quick_error! {
    /// Why a candidate [`crate::ids::RepositoryID`] was rejected.
    #[derive(Debug)]
    pub enum Error {
        Empty {
            display("a repository id must not be empty")
        }
        ContainsNewline {
            display("a repository id must not contain a newline")
        }
    }
}

pub(crate) fn repository_id(id: &str) -> Result<(), Error> {
    if id.is_empty() {
        return Err(Error::Empty);
    }
    if id.contains('\n') {
        return Err(Error::ContainsNewline);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(matches!(repository_id(""), Err(Error::Empty)));
    }

    #[test]
    fn rejects_embedded_newline() {
        assert!(matches!(repository_id("git@host:a\n/b.git"), Err(Error::ContainsNewline)));
    }

    #[test]
    fn accepts_a_url_like_id() {
        assert!(repository_id("https://gitserver.com/a").is_ok());
    }
}
