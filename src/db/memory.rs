use crate::db::{EngineError, EngineErrorKind, LedgerRow, QueryExecutor};

use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;


static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?(\w+)").expect("valid regex")
});
static DROP_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^DROP\s+TABLE\s+(IF\s+EXISTS\s+)?(\w+)\s*$").expect("valid regex")
});
static SELECT_ALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^SELECT\s+\*\s+FROM\s+(\w+)\s*$").expect("valid regex")
});
static INSERT_ROWS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^INSERT\s+INTO\s+(\w+)\s*\(\s*path\s*,\s*batch\s*\)\s*VALUES\s*(.+)$").expect("valid regex")
});
static DELETE_ROWS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^DELETE\s+FROM\s+(\w+)\s+WHERE\s+path\s+IN\s*\((.*)\)\s*$").expect("valid regex")
});
static VALUE_TUPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*'((?:[^']|'')*)'\s*,\s*(\d+)\s*\)").expect("valid regex")
});
static STRING_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'((?:[^']|'')*)'").expect("valid regex")
});


#[derive(Default)]
struct Table {
    rows: Vec<LedgerRow>,
    next_id: i32,
}


/// An in-process store that understands the statements the migration engine issues:
/// `CREATE TABLE`, `DROP TABLE`, `SELECT *`, ledger `INSERT` and `DELETE ... IN (...)`.
///
/// Tables other than the ledger are tracked by name only.
#[derive(Default)]
pub struct MemoryEngine {
    tables: BTreeMap<String, Table>,
    failing: HashSet<String>,
    statements: Vec<String>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later statement touching `table` fails with [`EngineErrorKind::Rejected`].
    pub fn fail_on(&mut self, table: &str) {
        self.failing.insert(table.to_string());
    }

    pub fn recover(&mut self, table: &str) {
        self.failing.remove(table);
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn rows(&self, table: &str) -> Vec<LedgerRow> {
        self.tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Statements received so far, trimmed and without the trailing semicolon.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    fn check_failure(&self, table: &str, sql: &str) -> Result<(), EngineError> {
        if self.failing.contains(table) {
            return Err(EngineError { kind: EngineErrorKind::Rejected(sql.to_string()) })
        }
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, EngineError> {
        self.tables.get_mut(name).ok_or_else(|| EngineError {
            kind: EngineErrorKind::RelationNotFound(format!("relation \"{name}\" does not exist")),
        })
    }

    fn run(&mut self, sql: &str) -> Result<Option<Vec<LedgerRow>>, EngineError> {
        let sql = sql.trim().trim_end_matches(';').trim();
        self.statements.push(sql.to_string());

        if let Some(caps) = CREATE_TABLE.captures(sql) {
            let name = caps[2].to_string();
            self.check_failure(&name, sql)?;
            if self.tables.contains_key(&name) {
                if caps.get(1).is_some() {
                    return Ok(None)
                }
                return Err(EngineError {
                    kind: EngineErrorKind::Rejected(format!("relation \"{name}\" already exists")),
                })
            }
            self.tables.insert(name, Table { rows: Vec::new(), next_id: 1 });
            return Ok(None)
        }

        if let Some(caps) = DROP_TABLE.captures(sql) {
            let name = caps[2].to_string();
            self.check_failure(&name, sql)?;
            if self.tables.remove(&name).is_none() && caps.get(1).is_none() {
                self.table_mut(&name)?;
            }
            return Ok(None)
        }

        if let Some(caps) = SELECT_ALL.captures(sql) {
            let name = caps[1].to_string();
            self.check_failure(&name, sql)?;
            return Ok(Some(self.table_mut(&name)?.rows.clone()))
        }

        if let Some(caps) = INSERT_ROWS.captures(sql) {
            let name = caps[1].to_string();
            self.check_failure(&name, sql)?;
            let values = caps[2].to_string();
            let table = self.table_mut(&name)?;
            for tuple in VALUE_TUPLE.captures_iter(&values) {
                let batch = tuple[2].parse::<u16>().map_err(|e| EngineError {
                    kind: EngineErrorKind::Rejected(format!("invalid batch '{}': {e}", &tuple[2])),
                })?;
                table.rows.push(LedgerRow {
                    id: table.next_id,
                    path: tuple[1].replace("''", "'"),
                    batch,
                });
                table.next_id += 1;
            }
            return Ok(None)
        }

        if let Some(caps) = DELETE_ROWS.captures(sql) {
            let name = caps[1].to_string();
            self.check_failure(&name, sql)?;
            let paths: HashSet<String> = STRING_LITERAL
                .captures_iter(&caps[2])
                .map(|literal| literal[1].replace("''", "'"))
                .collect();
            self.table_mut(&name)?.rows.retain(|row| !paths.contains(&row.path));
            return Ok(None)
        }

        Err(EngineError { kind: EngineErrorKind::Unsupported(sql.to_string()) })
    }
}


#[async_trait::async_trait]
impl QueryExecutor for MemoryEngine {
    async fn execute(&mut self, sql: &str) -> Result<(), EngineError> {
        self.run(sql).map(|_| ())
    }

    async fn query_ledger(&mut self, sql: &str) -> Result<Vec<LedgerRow>, EngineError> {
        match self.run(sql)? {
            Some(rows) => Ok(rows),
            None => Err(EngineError { kind: EngineErrorKind::Unsupported(sql.to_string()) }),
        }
    }
}
