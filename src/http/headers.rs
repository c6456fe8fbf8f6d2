//! Case-insensitive, case-preserving header table (§4.5, §9 "case-preserving
//! header map"). A normalized-key → original-key side table, the layered
//! abstract data type the design notes call for: `get`, `set`, `append`,
//! `iter` yielding `(original_case, values)`.

#[derive(Debug, Clone, Default)]
pub struct HeaderTable {
    entries: std::collections::HashMap<String, (String, Vec<String>)>,
    order: Vec<String>,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the slot for `name`, preserving `name`'s case only if this
    /// is the first time the field is written.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let norm = name.to_ascii_lowercase();
        match self.entries.get_mut(&norm) {
            Some(entry) => entry.1 = vec![value.into()],
            None => {
                self.order.push(norm.clone());
                self.entries.insert(norm, (name.to_string(), vec![value.into()]));
            }
        }
    }

    /// Appends a value, turning the slot into a multi-valued list — used
    /// when the same response header name recurs during parsing.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let norm = name.to_ascii_lowercase();
        match self.entries.get_mut(&norm) {
            Some(entry) => entry.1.push(value.into()),
            None => {
                self.order.push(norm.clone());
                self.entries.insert(norm, (name.to_string(), vec![value.into()]));
            }
        }
    }

    /// The most recently written value for `name`, read through any case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .and_then(|(_, values)| values.last())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) {
        let norm = name.to_ascii_lowercase();
        if self.entries.remove(&norm).is_some() {
            self.order.retain(|k| k != &norm);
        }
    }

    /// Yields `(original_case, values)` in first-write order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.order.iter().map(move |k| {
            let (orig, values) = &self.entries[k];
            (orig.as_str(), values.as_slice())
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges `other` into `self` only for names not already present — the
    /// trailer-fallback view (§9): trailers never overwrite a header that
    /// already has a value.
    pub fn merge_missing(&mut self, other: &HeaderTable) {
        for (name, values) in other.iter() {
            if !self.contains(name) {
                for value in values {
                    self.append(name, value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_first_write_case_and_reads_through_any_case() {
        let mut headers = HeaderTable::new();
        headers.set("Content-Type", "text/html");
        headers.set("content-type", "text/plain");
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        let (orig, _) = headers.iter().next().unwrap();
        assert_eq!(orig, "Content-Type");
    }

    #[test]
    fn append_builds_a_multi_valued_list() {
        let mut headers = HeaderTable::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");
        assert_eq!(headers.get_all("SET-COOKIE"), &["a=1", "b=2"]);
    }

    #[test]
    fn trailers_do_not_overwrite_existing_headers() {
        let mut headers = HeaderTable::new();
        headers.set("X-Checksum", "abc");
        let mut trailers = HeaderTable::new();
        trailers.set("x-checksum", "zzz");
        trailers.set("X-Extra", "new");
        headers.merge_missing(&trailers);
        assert_eq!(headers.get("x-checksum"), Some("abc"));
        assert_eq!(headers.get("x-extra"), Some("new"));
    }
}
