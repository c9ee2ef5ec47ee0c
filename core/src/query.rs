use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Category vocabulary
// ---------------------------------------------------------------------------

/// Topical tag assigned to every fix in the catalog. The set is closed:
/// membership is checked at query time and at catalog insertion, and the
/// canonical (stored) casing is uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Audit,
    Encryption,
    Dns,
    Gui,
    Ip,
    Login,
    Package,
    Session,
    Ssh,
    Logging,
}

impl Category {
    /// All categories, in display order.
    pub const ALL: [Category; 10] = [
        Category::Audit,
        Category::Encryption,
        Category::Dns,
        Category::Gui,
        Category::Ip,
        Category::Login,
        Category::Package,
        Category::Session,
        Category::Ssh,
        Category::Logging,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Audit => "AUDIT",
            Category::Encryption => "ENCRYPTION",
            Category::Dns => "DNS",
            Category::Gui => "GUI",
            Category::Ip => "IP",
            Category::Login => "LOGIN",
            Category::Package => "PACKAGE",
            Category::Session => "SESSION",
            Category::Ssh => "SSH",
            Category::Logging => "LOGGING",
        }
    }

    /// Case-insensitive membership lookup. Returns None for anything outside
    /// the closed set.
    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(token))
    }
}

// ---------------------------------------------------------------------------
// Selectors and operators
// ---------------------------------------------------------------------------

/// Attribute a query filters on. Exactly one per query; predicates are never
/// combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Category,
    CatRating,
    GroupId,
}

impl Selector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Selector::Category => "category",
            Selector::CatRating => "cat_rating",
            Selector::GroupId => "group_id",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        [Selector::Category, Selector::CatRating, Selector::GroupId]
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(token))
    }
}

/// Comparison operator. `CATEGORY` and `GROUP_ID` queries accept only `Eq`;
/// `CAT_RATING` queries accept all five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" => Some(Operator::Eq),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("queries take exactly 3 parts (selector, operator, value), got {0}")]
    MalformedQuery(usize),
    #[error("unknown selector `{0}`; choose from CATEGORY, CAT_RATING, or GROUP_ID")]
    UnknownSelector(String),
    #[error("{selector} queries must use the {expected} operator, got `{got}`")]
    InvalidOperator {
        selector: &'static str,
        expected: &'static str,
        got: String,
    },
    #[error("`{got}` is not a valid category; see --categories for the full list")]
    InvalidCategory { got: String },
    #[error("{selector} queries must reference an integer value, got `{got}`")]
    InvalidInteger {
        selector: &'static str,
        got: String,
    },
}

// ---------------------------------------------------------------------------
// Typed queries
// ---------------------------------------------------------------------------

/// A validated query, tagged by selector kind so the operator invariant is
/// carried in the type: equality-only selectors simply have no operator slot.
/// Built once by [`parse`]; execution never re-reads raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Category(Category),
    CatRating { operator: Operator, value: i64 },
    GroupId(i64),
}

impl Query {
    pub fn selector(&self) -> Selector {
        match self {
            Query::Category(_) => Selector::Category,
            Query::CatRating { .. } => Selector::CatRating,
            Query::GroupId(_) => Selector::GroupId,
        }
    }

    pub fn operator(&self) -> Operator {
        match self {
            Query::CatRating { operator, .. } => *operator,
            _ => Operator::Eq,
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Query::Category(c) => write!(f, "CATEGORY = {}", c.as_str()),
            Query::CatRating { operator, value } => {
                write!(f, "CAT_RATING {} {value}", operator.as_str())
            }
            Query::GroupId(id) => write!(f, "GROUP_ID = {id}"),
        }
    }
}

/// Parse a raw query line into a typed [`Query`].
///
/// Grammar: three whitespace-separated tokens `SELECTOR OPERATOR VALUE`.
/// Selector and operator tokens are case-insensitive. `CATEGORY` values must
/// belong to the closed category set; `GROUP_ID` and `CAT_RATING` values must
/// be integers. The [1,3] rating bound is enforced by the catalog schema at
/// insertion, not re-checked here, so comparison literals outside the bound
/// stay legal (they match everything or nothing).
///
/// Pure: no catalog access, no I/O.
pub fn parse(raw: &str) -> Result<Query, ParseError> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() != 3 {
        return Err(ParseError::MalformedQuery(tokens.len()));
    }

    let selector = Selector::parse(tokens[0])
        .ok_or_else(|| ParseError::UnknownSelector(tokens[0].to_string()))?;

    match selector {
        Selector::Category => {
            expect_equality(selector, tokens[1])?;
            let value = Category::parse(tokens[2]).ok_or_else(|| ParseError::InvalidCategory {
                got: tokens[2].to_string(),
            })?;
            Ok(Query::Category(value))
        }
        Selector::GroupId => {
            expect_equality(selector, tokens[1])?;
            Ok(Query::GroupId(parse_integer(selector, tokens[2])?))
        }
        Selector::CatRating => {
            let operator =
                Operator::parse(tokens[1]).ok_or_else(|| ParseError::InvalidOperator {
                    selector: "CAT_RATING",
                    expected: "=, <, <=, >, or >=",
                    got: tokens[1].to_string(),
                })?;
            let value = parse_integer(selector, tokens[2])?;
            Ok(Query::CatRating { operator, value })
        }
    }
}

/// Equality-only selectors reject every other operator token, including
/// otherwise-valid comparison operators.
fn expect_equality(selector: Selector, token: &str) -> Result<(), ParseError> {
    if token == "=" {
        Ok(())
    } else {
        Err(ParseError::InvalidOperator {
            selector: match selector {
                Selector::Category => "CATEGORY",
                Selector::GroupId => "GROUP_ID",
                Selector::CatRating => "CAT_RATING",
            },
            expected: "=",
            got: token.to_string(),
        })
    }
}

fn parse_integer(selector: Selector, token: &str) -> Result<i64, ParseError> {
    token.parse::<i64>().map_err(|_| ParseError::InvalidInteger {
        selector: match selector {
            Selector::CatRating => "CAT_RATING",
            Selector::GroupId => "GROUP_ID",
            Selector::Category => "CATEGORY",
        },
        got: token.to_string(),
    })
}
