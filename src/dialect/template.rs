use crate::types::RowValues;

/// One piece of a [`SqlTemplate`].
#[derive(Debug, Clone, PartialEq)]
pub enum SqlChunk {
    /// Verbatim SQL text
    Raw(String),
    /// A bound parameter
    Param(RowValues),
    /// A possibly schema-qualified identifier, quoted per dialect
    Identifier(Vec<String>),
}

/// Dialect-neutral statement: text, parameters and identifiers in order.
///
/// ```rust
/// use db_switchboard::prelude::*;
///
/// let template = SqlTemplate::new("SELECT * FROM ")
///     .qualified(["app", "users"])
///     .raw(" WHERE id = ")
///     .param(42)
///     .raw(" AND name = ")
///     .param("bob");
///
/// let pg = formatter_for(Dialect::Postgresql).render(&template);
/// assert_eq!(pg.sql, r#"SELECT * FROM "app"."users" WHERE id = $1 AND name = $2"#);
///
/// let my = formatter_for(Dialect::Mysql).render(&template);
/// assert_eq!(my.sql, "SELECT * FROM `app`.`users` WHERE id = ? AND name = ?");
/// assert_eq!(my.params, vec![RowValues::Int(42), RowValues::Text("bob".into())]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlTemplate {
    chunks: Vec<SqlChunk>,
}

impl SqlTemplate {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self::default().raw(sql)
    }

    #[must_use]
    pub fn raw(mut self, sql: impl Into<String>) -> Self {
        self.push(SqlChunk::Raw(sql.into()));
        self
    }

    #[must_use]
    pub fn param(mut self, value: impl Into<RowValues>) -> Self {
        self.push(SqlChunk::Param(value.into()));
        self
    }

    #[must_use]
    pub fn ident(mut self, name: impl Into<String>) -> Self {
        self.push(SqlChunk::Identifier(vec![name.into()]));
        self
    }

    #[must_use]
    pub fn qualified<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(SqlChunk::Identifier(parts.into_iter().map(Into::into).collect()));
        self
    }

    /// Parameters joined by `separator`, e.g. the body of an `IN (...)` list.
    #[must_use]
    pub fn params<I, V>(mut self, values: I, separator: &str) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<RowValues>,
    {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.push(SqlChunk::Raw(separator.to_string()));
            }
            self.push(SqlChunk::Param(value.into()));
        }
        self
    }

    #[must_use]
    pub fn append(mut self, other: SqlTemplate) -> Self {
        for chunk in other.chunks {
            self.push(chunk);
        }
        self
    }

    /// Adjacent raw chunks are merged.
    pub fn push(&mut self, chunk: SqlChunk) {
        if let SqlChunk::Raw(text) = &chunk {
            if text.is_empty() {
                return;
            }
            if let Some(SqlChunk::Raw(last)) = self.chunks.last_mut() {
                last.push_str(text);
                return;
            }
        }
        self.chunks.push(chunk);
    }

    #[must_use]
    pub fn chunks(&self) -> &[SqlChunk] {
        &self.chunks
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| matches!(c, SqlChunk::Param(_)))
            .count()
    }
}

/// Statement text and positional parameters for one dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub params: Vec<RowValues>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{formatter_for, inline_params};
    use crate::types::Dialect;

    #[test]
    fn placeholders_follow_parameter_order() {
        let template = SqlTemplate::new("SELECT ")
            .params([1, 2, 3], ", ")
            .raw(" FROM ")
            .ident("t")
            .raw(" WHERE x = ")
            .param("four");

        let pg = formatter_for(Dialect::Postgresql).render(&template);
        assert_eq!(pg.sql, "SELECT $1, $2, $3 FROM \"t\" WHERE x = $4");
        assert_eq!(pg.params.len(), 4);
        assert_eq!(pg.params[3], RowValues::Text("four".into()));

        let my = formatter_for(Dialect::Mysql).render(&template);
        assert_eq!(my.sql, "SELECT ?, ?, ? FROM `t` WHERE x = ?");
        assert_eq!(my.params, pg.params);
        assert_eq!(template.param_count(), 4);
    }

    #[test]
    fn rendered_output_inlines_back_to_the_same_literals() {
        let template = SqlTemplate::new("UPDATE ")
            .ident("accounts")
            .raw(" SET owner = ")
            .param("o'hara")
            .raw(" WHERE id = ")
            .param(9);
        for dialect in [Dialect::Postgresql, Dialect::Mysql] {
            let rendered = formatter_for(dialect).render(&template);
            let inlined = inline_params(&rendered.sql, &rendered.params, dialect).unwrap();
            assert!(inlined.ends_with("WHERE id = 9"), "{inlined}");
        }
    }

    #[test]
    fn raw_chunks_merge() {
        let template = SqlTemplate::new("a").raw("b").raw("").append(SqlTemplate::new("c"));
        assert_eq!(template.chunks(), &[SqlChunk::Raw("abc".into())]);
    }
}
