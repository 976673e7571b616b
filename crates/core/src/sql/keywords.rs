/// Reserved and common non-reserved words across SQLite and PostgreSQL. Words
/// on this list are never treated as identifiers or bare literals.
const KEYWORDS: &[&str] = &[
    "ABORT", "ALL", "ALTER", "ANALYZE", "AND", "ANY", "AS", "ASC", "ATTACH", "BEGIN", "BETWEEN",
    "BIGINT", "BLOB", "BOOLEAN", "BOTH", "BY", "CASCADE", "CASE", "CAST", "CHAR", "COLLATE",
    "COLUMN", "COMMIT", "CONSTRAINT", "CREATE", "CROSS", "CURRENT", "CURRENT_DATE",
    "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DATE", "DAY", "DECIMAL", "DEFAULT", "DELETE",
    "DESC", "DETACH", "DISTINCT", "DO", "DOUBLE", "DROP", "ELSE", "END", "ESCAPE", "EXCEPT",
    "EXCLUDE", "EXISTS", "EXPLAIN", "FALSE", "FETCH", "FILTER", "FIRST", "FLOAT", "FOLLOWING",
    "FOR", "FOREIGN", "FROM", "FULL", "GLOB", "GRANT", "GROUP", "GROUPS", "HAVING", "HOUR", "IF",
    "ILIKE", "IN", "INDEX", "INNER", "INSERT", "INT", "INTEGER", "INTERSECT", "INTERVAL", "INTO",
    "IS", "ISNULL", "JOIN", "KEY", "LAST", "LATERAL", "LEFT", "LIKE", "LIMIT", "MATCH",
    "MATERIALIZED", "MERGE", "MINUTE", "MONTH", "NATURAL", "NEXT", "NO", "NOCASE", "NOT",
    "NOTNULL", "NULL", "NULLS", "NUMERIC", "OF", "OFFSET", "ON", "ONLY", "OR", "ORDER", "OTHERS",
    "OUTER", "OVER", "PARTITION", "PERCENT", "PRAGMA", "PRECEDING", "PRIMARY", "RANGE", "REAL",
    "RECURSIVE", "REFERENCES", "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE", "RETURNING",
    "REVOKE", "RIGHT", "ROLLBACK", "ROW", "ROWS", "SAVEPOINT", "SECOND", "SELECT", "SET",
    "SIMILAR", "SMALLINT", "SOME", "TABLE", "TEMP", "TEMPORARY", "TEXT", "THEN", "TIES", "TIME",
    "TIMESTAMP", "TO", "TOP", "TRANSACTION", "TRIGGER", "TRUE", "TRUNCATE", "UNBOUNDED", "UNION",
    "UNIQUE", "UNKNOWN", "UPDATE", "USING", "VACUUM", "VALUES", "VARCHAR", "VIEW", "WHEN",
    "WHERE", "WINDOW", "WITH", "WITHOUT", "YEAR",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|keyword| keyword.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use super::is_keyword;

    #[test]
    fn keyword_lookup_ignores_case() {
        assert!(is_keyword("select"));
        assert!(is_keyword("Group"));
        assert!(!is_keyword("students"));
    }
}
