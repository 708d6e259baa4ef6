//! Scope filter: which classes may host an experiment
//!
//! A class is in scope when its name starts with at least one search prefix
//! and with none of the ignored prefixes. Prefixes are canonicalised to the
//! slash-separated internal form once, when they are added, so matching is a
//! plain `starts_with` on the class name.
//!
//! Methods of in-scope classes are collected into [`InScopeMethods`], the set
//! the sampler consults from signal context.

use std::borrow::Cow;
use std::collections::HashSet;

use crate::frame::{CallFrame, MethodId};
use crate::spinlock::SpinLock;

/// Search and ignore prefix lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    search: Vec<String>,
    ignored: Vec<String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pipe-delimited prefix lists (`"com.acme|org.util"`).
    pub fn from_lists(search: &str, ignored: &str) -> Self {
        let mut scope = Self::new();
        for prefix in split_prefixes(search) {
            scope.add_search(prefix);
        }
        for prefix in split_prefixes(ignored) {
            scope.add_ignored(prefix);
        }
        scope
    }

    /// Canonical prefix form: package separators become '/'.
    pub fn normalize_prefix(prefix: &str) -> String {
        prefix.trim().replace('.', "/")
    }

    pub fn add_search(&mut self, prefix: &str) {
        let prefix = Self::normalize_prefix(prefix);
        if !prefix.is_empty() {
            self.search.push(prefix);
        }
    }

    pub fn add_ignored(&mut self, prefix: &str) {
        let prefix = Self::normalize_prefix(prefix);
        if !prefix.is_empty() {
            self.ignored.push(prefix);
        }
    }

    pub fn search_scopes(&self) -> &[String] {
        &self.search
    }

    pub fn ignored_scopes(&self) -> &[String] {
        &self.ignored
    }

    /// No search prefixes means nothing can ever be in scope.
    pub fn is_empty(&self) -> bool {
        self.search.is_empty()
    }

    /// Test a class signature (`Lcom/acme/Foo;`) or a plain class name
    /// (`com.acme.Foo`, `com/acme/Foo`).
    pub fn is_in_scope(&self, signature: &str) -> bool {
        let name = internal_class_name(signature);
        let matches = |prefix: &String| name.starts_with(prefix.as_str());
        self.search.iter().any(matches) && !self.ignored.iter().any(matches)
    }
}

fn split_prefixes(list: &str) -> impl Iterator<Item = &str> {
    list.split('|').map(str::trim).filter(|p| !p.is_empty())
}

/// Slash-separated class name for either a signature or a plain name.
pub fn internal_class_name(signature: &str) -> Cow<'_, str> {
    let trimmed = signature.trim();
    if let Some(inner) = trimmed
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
    {
        return Cow::Borrowed(inner);
    }
    if trimmed.contains('.') {
        Cow::Owned(trimmed.replace('.', "/"))
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Method ids of every in-scope class seen so far.
pub struct InScopeMethods {
    ids: SpinLock<HashSet<MethodId>>,
}

impl InScopeMethods {
    pub fn new() -> Self {
        Self {
            ids: SpinLock::new(HashSet::new()),
        }
    }

    pub fn register(&self, methods: &[MethodId]) {
        let mut ids = self.ids.lock();
        ids.reserve(methods.len());
        ids.extend(methods.iter().copied().filter(|m| !m.is_none()));
    }

    pub fn clear(&self) {
        self.ids.lock().clear();
    }

    pub fn contains(&self, method: MethodId) -> bool {
        self.ids.lock().contains(&method)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First frame, top of stack downwards, whose method is in scope.
    ///
    /// Signal-context entry point: lookups do not allocate, and when the
    /// interrupted thread is itself in the middle of `register` the set is
    /// left alone and `None` comes back.
    pub fn first_match(&self, frames: &[CallFrame]) -> Option<CallFrame> {
        let ids = self.ids.lock_unless_owned()?;
        frames.iter().copied().find(|f| ids.contains(&f.method))
    }
}

impl Default for InScopeMethods {
    fn default() -> Self {
        Self::new()
    }
}
