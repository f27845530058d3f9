//! `FindAndModify`.
//!
//! `FindAndUpdate`/`FindAndReplace`/`FindAndRemove` share one
//! [`FindAndModify`] value built from a tagged [`FindAndModifyVariant`]:
//! the filter, sort, fields, and upsert/return-new state is common across
//! all three, while the variant determines command assembly and the
//! client-side validators each shape enforces. The per-variant builders
//! below are the only place those validators run, at `build()`, before any
//! request reaches the wire.

use bson::Document;

use crate::{
    error::{ErrorKind, Result},
    session::Session,
    selection_criteria::SelectionCriteria,
    Namespace,
};

/// The command-assembly and validation behavior that differs across the
/// three find-and-modify shapes.
#[derive(Debug, Clone)]
pub enum FindAndModifyVariant {
    Update {
        update: Document,
        upsert: bool,
        return_new: bool,
    },
    Replace {
        replacement: Document,
        upsert: bool,
        return_new: bool,
    },
    Remove,
}

/// A fully built, ready-to-execute find-and-modify command. Only reachable
/// through [`FindAndUpdate::build`], [`FindAndReplace::build`], or
/// [`FindAndRemove::build`] — each of which applies its variant's
/// validator before handing back a value.
#[derive(Debug, Clone)]
pub struct FindAndModify {
    namespace: Namespace,
    query: Document,
    sort: Option<Document>,
    fields: Option<Document>,
    variant: FindAndModifyVariant,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FindAndModifyResult {
    pub value: Option<Document>,
    pub updated_existing: Option<bool>,
}

impl FindAndModify {
    /// Sent as `OP_QUERY` on `<db>.$cmd` with `numberToReturn: -1`, the
    /// same framing `RunCommand` and `getLastError` use.
    pub fn execute(&self, session: &Session) -> Result<FindAndModifyResult> {
        let mut conn = session.checkout(&SelectionCriteria::Write)?;

        let mut command = bson::doc! {
            "findandmodify": self.namespace.coll.clone(),
            "query": self.query.clone(),
        };
        if let Some(sort) = &self.sort {
            command.insert("sort", sort.clone());
        }
        if let Some(fields) = &self.fields {
            command.insert("fields", fields.clone());
        }

        match &self.variant {
            FindAndModifyVariant::Update { update, upsert, return_new } => {
                command.insert("update", update.clone());
                command.insert("upsert", *upsert);
                command.insert("new", *return_new);
            }
            FindAndModifyVariant::Replace { replacement, upsert, return_new } => {
                command.insert("update", replacement.clone());
                command.insert("upsert", *upsert);
                command.insert("new", *return_new);
            }
            FindAndModifyVariant::Remove => {
                command.insert("remove", true);
            }
        }

        let reply = crate::auth::run_command(&mut conn, &self.namespace.db, command)?;

        let value = match reply.get("value") {
            Some(bson::Bson::Document(doc)) => Some(doc.clone()),
            _ => None,
        };
        let updated_existing = reply
            .get_document("lastErrorObject")
            .ok()
            .and_then(|doc| doc.get_bool("updatedExisting").ok());

        Ok(FindAndModifyResult { value, updated_existing })
    }
}

/// Builder for the `update` variant. No client-side validator applies —
/// any update document is legal, including `$`-operator documents, since
/// that's the whole point of an update (as opposed to a replace).
#[derive(Debug, Clone)]
pub struct FindAndUpdate {
    namespace: Namespace,
    query: Document,
    update: Document,
    sort: Option<Document>,
    fields: Option<Document>,
    upsert: bool,
    return_new: bool,
}

impl FindAndUpdate {
    pub fn new(namespace: Namespace, query: Document, update: Document) -> Self {
        Self {
            namespace,
            query,
            update,
            sort: None,
            fields: None,
            upsert: false,
            return_new: false,
        }
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn fields(mut self, fields: Document) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn return_new(mut self, return_new: bool) -> Self {
        self.return_new = return_new;
        self
    }

    pub fn build(self) -> FindAndModify {
        FindAndModify {
            namespace: self.namespace,
            query: self.query,
            sort: self.sort,
            fields: self.fields,
            variant: FindAndModifyVariant::Update {
                update: self.update,
                upsert: self.upsert,
                return_new: self.return_new,
            },
        }
    }
}

/// Builder for the `replace` variant. `build()` rejects any replacement
/// document with a top-level key beginning with `$` — a `$`-prefixed key
/// there means the caller meant to send an update operator document, not a
/// full replacement.
#[derive(Debug, Clone)]
pub struct FindAndReplace {
    namespace: Namespace,
    query: Document,
    replacement: Document,
    sort: Option<Document>,
    fields: Option<Document>,
    upsert: bool,
    return_new: bool,
}

impl FindAndReplace {
    pub fn new(namespace: Namespace, query: Document, replacement: Document) -> Self {
        Self {
            namespace,
            query,
            replacement,
            sort: None,
            fields: None,
            upsert: false,
            return_new: false,
        }
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn fields(mut self, fields: Document) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn return_new(mut self, return_new: bool) -> Self {
        self.return_new = return_new;
        self
    }

    pub fn build(self) -> Result<FindAndModify> {
        if let Some(key) = self.replacement.keys().find(|k| k.starts_with('$')) {
            return Err(ErrorKind::Config {
                message: format!(
                    "replacement document must not contain update operators (found top-level key `{key}`)"
                ),
            }
            .into());
        }

        Ok(FindAndModify {
            namespace: self.namespace,
            query: self.query,
            sort: self.sort,
            fields: self.fields,
            variant: FindAndModifyVariant::Replace {
                replacement: self.replacement,
                upsert: self.upsert,
                return_new: self.return_new,
            },
        })
    }
}

/// Builder for the `remove` variant. `build()` rejects any attempt to set
/// `upsert` — upserting on a remove makes no sense and is rejected as a
/// client-side error before any request reaches the wire.
#[derive(Debug, Clone)]
pub struct FindAndRemove {
    namespace: Namespace,
    query: Document,
    sort: Option<Document>,
    fields: Option<Document>,
    upsert: bool,
}

impl FindAndRemove {
    pub fn new(namespace: Namespace, query: Document) -> Self {
        Self {
            namespace,
            query,
            sort: None,
            fields: None,
            upsert: false,
        }
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn fields(mut self, fields: Document) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn build(self) -> Result<FindAndModify> {
        if self.upsert {
            return Err(ErrorKind::Config {
                message: "upsert is not a valid option for a find-and-remove".to_string(),
            }
            .into());
        }

        Ok(FindAndModify {
            namespace: self.namespace,
            query: self.query,
            sort: self.sort,
            fields: self.fields,
            variant: FindAndModifyVariant::Remove,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new("appdb", "widgets")
    }

    #[test]
    fn find_and_replace_rejects_dollar_prefixed_top_level_key() {
        let err = FindAndReplace::new(ns(), bson::doc! {}, bson::doc! { "$set": { "x": 1 } })
            .build()
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Config { .. }));
    }

    #[test]
    fn find_and_replace_accepts_a_plain_replacement_document() {
        let built = FindAndReplace::new(ns(), bson::doc! {}, bson::doc! { "x": 1 }).build();
        assert!(built.is_ok());
    }

    #[test]
    fn find_and_remove_rejects_upsert() {
        let err = FindAndRemove::new(ns(), bson::doc! {})
            .upsert(true)
            .build()
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Config { .. }));
    }

    #[test]
    fn find_and_remove_without_upsert_builds() {
        let built = FindAndRemove::new(ns(), bson::doc! {}).build();
        assert!(built.is_ok());
    }

    #[test]
    fn find_and_update_needs_no_validator() {
        let built = FindAndUpdate::new(ns(), bson::doc! {}, bson::doc! { "$set": { "x": 1 } }).build();
        assert!(matches!(built.variant, FindAndModifyVariant::Update { .. }));
    }
}
