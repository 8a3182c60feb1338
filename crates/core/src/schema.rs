//! Tables, fields and lookup indexes of the snippet backend, plus the record
//! types stored in them.

use crate::types::ExecutionResult;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum FieldKind {
    String,
    OptionalString,
    /// Reference to a row of the named table.
    Id(&'static str),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct IndexDef {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TableDef {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
    pub indexes: &'static [IndexDef],
}

impl TableDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

const fn field(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef { name, kind }
}

const BY_USER_ID: IndexDef = IndexDef {
    name: "by_user_id",
    fields: &["userId"],
};

const BY_SNIPPET_ID: IndexDef = IndexDef {
    name: "by_snippet_id",
    fields: &["snippetId"],
};

pub const USERS: TableDef = TableDef {
    name: "users",
    fields: &[
        field("userId", FieldKind::String),
        field("email", FieldKind::String),
        field("name", FieldKind::String),
    ],
    indexes: &[BY_USER_ID],
};

pub const CODE_EXECUTIONS: TableDef = TableDef {
    name: "codeExecutions",
    fields: &[
        field("userId", FieldKind::String),
        field("language", FieldKind::String),
        field("code", FieldKind::String),
        field("output", FieldKind::OptionalString),
        field("error", FieldKind::OptionalString),
    ],
    indexes: &[BY_USER_ID],
};

pub const SNIPPETS: TableDef = TableDef {
    name: "snippets",
    fields: &[
        field("userId", FieldKind::String),
        field("title", FieldKind::String),
        field("language", FieldKind::String),
        field("code", FieldKind::String),
        field("userName", FieldKind::String),
    ],
    indexes: &[BY_USER_ID],
};

pub const SNIPPET_COMMENTS: TableDef = TableDef {
    name: "snippetComments",
    fields: &[
        field("snippetId", FieldKind::Id("snippets")),
        field("userId", FieldKind::String),
        field("username", FieldKind::String),
        field("content", FieldKind::String),
    ],
    indexes: &[BY_SNIPPET_ID],
};

pub const STARS: TableDef = TableDef {
    name: "stars",
    fields: &[
        field("snippetId", FieldKind::Id("snippets")),
        field("userId", FieldKind::String),
    ],
    indexes: &[
        BY_SNIPPET_ID,
        BY_USER_ID,
        IndexDef {
            name: "by_user_id_and_snippet_id",
            fields: &["userId", "snippetId"],
        },
    ],
};

const SCHEMA: &[TableDef] = &[USERS, CODE_EXECUTIONS, SNIPPETS, SNIPPET_COMMENTS, STARS];

/// Every table of the backend, in declaration order.
pub fn schema() -> &'static [TableDef] {
    SCHEMA
}

pub fn table(name: &str) -> Option<&'static TableDef> {
    SCHEMA.iter().find(|t| t.name == name)
}

macro_rules! row_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(ExecutionId);
row_id!(SnippetId);
row_id!(CommentId);

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub creation_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeExecution {
    pub id: ExecutionId,
    pub user_id: String,
    pub language: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub creation_time: u64,
}

/// Fields of a new `codeExecutions` row.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewExecution {
    pub language: String,
    pub code: String,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl NewExecution {
    /// Row for an editor run; empty output or error are stored as absent.
    pub fn from_result(language: &str, result: &ExecutionResult) -> Self {
        Self {
            language: language.to_string(),
            code: result.code.clone(),
            output: Some(result.output.clone()).filter(|o| !o.is_empty()),
            error: result.error.clone().filter(|e| !e.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub id: SnippetId,
    pub user_id: String,
    pub title: String,
    pub language: String,
    pub code: String,
    pub user_name: String,
    pub creation_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnippetComment {
    pub id: CommentId,
    pub snippet_id: SnippetId,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub creation_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Star {
    pub snippet_id: SnippetId,
    pub user_id: String,
    pub creation_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_five_tables() {
        let names: Vec<_> = schema().iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            ["users", "codeExecutions", "snippets", "snippetComments", "stars"]
        );
    }

    #[test]
    fn owner_scoped_tables_index_user_id() {
        for name in ["users", "codeExecutions", "snippets", "stars"] {
            let t = table(name).expect("table declared");
            let index = t.index("by_user_id").expect("by_user_id index");
            assert_eq!(index.fields, ["userId"]);
        }
    }

    #[test]
    fn child_tables_reference_snippets() {
        for name in ["snippetComments", "stars"] {
            let t = table(name).expect("table declared");
            assert_eq!(
                t.field("snippetId").map(|f| f.kind),
                Some(FieldKind::Id("snippets"))
            );
            assert!(t.index("by_snippet_id").is_some());
        }
    }

    #[test]
    fn star_membership_uses_composite_index() {
        let index = STARS
            .index("by_user_id_and_snippet_id")
            .expect("composite index");
        assert_eq!(index.fields, ["userId", "snippetId"]);
    }

    #[test]
    fn execution_row_drops_empty_fields() {
        let ok = ExecutionResult::succeeded("print(1)".into(), "1".into());
        let row = NewExecution::from_result("python", &ok);
        assert_eq!(row.output.as_deref(), Some("1"));
        assert_eq!(row.error, None);

        let failed = ExecutionResult::failed("print(".into(), "SyntaxError".into());
        let row = NewExecution::from_result("python", &failed);
        assert_eq!(row.output, None);
        assert_eq!(row.error.as_deref(), Some("SyntaxError"));
    }

    #[test]
    fn records_serialize_with_backend_field_names() {
        let snippet = Snippet {
            id: SnippetId(7),
            user_id: "user_1".into(),
            title: "hello".into(),
            language: "go".into(),
            code: "package main".into(),
            user_name: "Ada".into(),
            creation_time: 1,
        };
        let value = serde_json::to_value(&snippet).unwrap();
        assert_eq!(value["userName"], "Ada");
        assert_eq!(value["id"], 7);
    }
}
