//! Search-term compiler for the libSQL index.
//!
//! Supported terms: `tag:<t>`, `id:<message-id>`, `path:<prefix>` and `*`.
//! A term can be negated with `not <term>` or `-<term>`. Terms are ANDed
//! (an explicit `and` is accepted), and `or` separates AND-groups.

use crate::error::StoreError;

/// A single search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    All,
    Tag(String),
    Id(String),
    PathPrefix(String),
}

/// A possibly negated term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub negated: bool,
    pub term: Term,
}

/// Disjunction of conjunctions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchExpr {
    groups: Vec<Vec<Clause>>,
}

impl SearchExpr {
    /// Parse a search string.
    pub fn parse(search: &str) -> Result<Self, StoreError> {
        let mut groups: Vec<Vec<Clause>> = Vec::new();
        let mut current: Vec<Clause> = Vec::new();
        let mut negate = false;
        let mut pending_and = false;

        for token in search.split_whitespace() {
            match token {
                "and" | "AND" => {
                    if current.is_empty() || negate || pending_and {
                        return Err(invalid("'and' must sit between two terms"));
                    }
                    pending_and = true;
                }
                "or" | "OR" => {
                    if current.is_empty() || negate || pending_and {
                        return Err(invalid("'or' must sit between two terms"));
                    }
                    groups.push(std::mem::take(&mut current));
                }
                "not" | "NOT" => negate = !negate,
                _ => {
                    let (negated, body) = match token.strip_prefix('-') {
                        Some(rest) if !rest.is_empty() => (!negate, rest),
                        _ => (negate, token),
                    };
                    current.push(Clause {
                        negated,
                        term: parse_term(body)?,
                    });
                    negate = false;
                    pending_and = false;
                }
            }
        }

        if negate || pending_and {
            return Err(invalid("search ends with a dangling operator"));
        }
        if current.is_empty() {
            return Err(if groups.is_empty() {
                invalid("empty search")
            } else {
                invalid("'or' must sit between two terms")
            });
        }
        groups.push(current);

        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[Vec<Clause>] {
        &self.groups
    }

    /// Render as a SQL condition over `messages m`, with positional parameters.
    pub fn to_sql(&self) -> (String, Vec<String>) {
        let mut params = Vec::new();
        let groups: Vec<String> = self
            .groups
            .iter()
            .map(|group| {
                let clauses: Vec<String> = group
                    .iter()
                    .map(|clause| {
                        let sql = term_sql(&clause.term, &mut params);
                        if clause.negated {
                            format!("NOT ({sql})")
                        } else {
                            sql
                        }
                    })
                    .collect();
                format!("({})", clauses.join(" AND "))
            })
            .collect();
        (groups.join(" OR "), params)
    }
}

fn parse_term(token: &str) -> Result<Term, StoreError> {
    if token == "*" {
        return Ok(Term::All);
    }
    let Some((prefix, value)) = token.split_once(':') else {
        return Err(invalid(&format!(
            "unsupported search term '{token}' (expected tag:, id:, path: or *)"
        )));
    };
    if value.is_empty() {
        return Err(invalid(&format!("'{prefix}:' needs a value")));
    }
    match prefix {
        "tag" => Ok(Term::Tag(value.to_string())),
        "id" => Ok(Term::Id(
            value.trim_start_matches('<').trim_end_matches('>').to_string(),
        )),
        "path" => Ok(Term::PathPrefix(value.to_string())),
        other => Err(invalid(&format!("unsupported search prefix '{other}:'"))),
    }
}

fn term_sql(term: &Term, params: &mut Vec<String>) -> String {
    match term {
        Term::All => "1".to_string(),
        Term::Tag(tag) => {
            params.push(tag.clone());
            "EXISTS (SELECT 1 FROM tags t WHERE t.message_id = m.id AND t.tag = ?)".to_string()
        }
        Term::Id(id) => {
            params.push(id.clone());
            "m.id = ?".to_string()
        }
        Term::PathPrefix(prefix) => {
            params.push(prefix.clone());
            "instr(m.path, ?) = 1".to_string()
        }
    }
}

fn invalid(reason: &str) -> StoreError {
    StoreError::InvalidQuery(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(negated: bool, term: Term) -> Clause {
        Clause { negated, term }
    }

    #[test]
    fn implicit_and() {
        let expr = SearchExpr::parse("tag:inbox tag:unread").unwrap();
        assert_eq!(
            expr.groups(),
            &[vec![
                clause(false, Term::Tag("inbox".into())),
                clause(false, Term::Tag("unread".into())),
            ]]
        );
    }

    #[test]
    fn explicit_and_is_equivalent() {
        assert_eq!(
            SearchExpr::parse("tag:inbox and tag:unread").unwrap(),
            SearchExpr::parse("tag:inbox tag:unread").unwrap()
        );
    }

    #[test]
    fn negation_forms() {
        let expr = SearchExpr::parse("tag:inbox not tag:spam -tag:ham").unwrap();
        assert_eq!(
            expr.groups()[0],
            vec![
                clause(false, Term::Tag("inbox".into())),
                clause(true, Term::Tag("spam".into())),
                clause(true, Term::Tag("ham".into())),
            ]
        );
    }

    #[test]
    fn or_splits_groups() {
        let expr = SearchExpr::parse("tag:a tag:b or id:x").unwrap();
        assert_eq!(expr.groups().len(), 2);
        assert_eq!(expr.groups()[1], vec![clause(false, Term::Id("x".into()))]);
    }

    #[test]
    fn id_strips_angle_brackets() {
        let expr = SearchExpr::parse("id:<abc@example.com>").unwrap();
        assert_eq!(
            expr.groups()[0][0].term,
            Term::Id("abc@example.com".into())
        );
    }

    #[test]
    fn star_matches_everything() {
        let (sql, params) = SearchExpr::parse("*").unwrap().to_sql();
        assert_eq!(sql, "(1)");
        assert!(params.is_empty());
    }

    #[test]
    fn sql_rendering_keeps_parameter_order() {
        let (sql, params) = SearchExpr::parse("tag:inbox -path:/mail/spam or id:m1")
            .unwrap()
            .to_sql();
        assert_eq!(params, vec!["inbox", "/mail/spam", "m1"]);
        assert!(sql.contains("NOT (instr(m.path, ?) = 1)"));
        assert!(sql.contains(" OR (m.id = ?)"));
    }

    #[test]
    fn rejects_bare_words() {
        let err = SearchExpr::parse("viagra").unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!(SearchExpr::parse("from:alice@example.com").is_err());
    }

    #[test]
    fn rejects_empty_and_dangling() {
        assert!(SearchExpr::parse("").is_err());
        assert!(SearchExpr::parse("   ").is_err());
        assert!(SearchExpr::parse("tag:a or").is_err());
        assert!(SearchExpr::parse("or tag:a").is_err());
        assert!(SearchExpr::parse("tag:a not").is_err());
        assert!(SearchExpr::parse("tag:a and").is_err());
        assert!(SearchExpr::parse("tag:").is_err());
    }
}
