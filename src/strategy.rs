//! Write strategy selection.
//!
//! Each table's [`StrategyKind`] is resolved once into a [`WritePlan`] that
//! carries everything the store needs: the conflict key and, for upserts, the
//! columns that get overwritten. Stores dispatch on the plan instead of on the
//! table name.

use itertools::Itertools;

use crate::{
    catalog::{StrategyKind, TableSpec},
    error::{LoadError, LoadResult},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePlan {
    /// Insert; rows colliding on the key are skipped.
    AppendSkip { key_columns: Vec<String> },
    /// Insert; on key collision overwrite every non-key column.
    Upsert {
        key_columns: Vec<String>,
        update_columns: Vec<String>,
    },
    /// Delete every existing row, then insert without conflict handling.
    TruncateReload,
}

impl WritePlan {
    pub fn resolve(spec: &TableSpec) -> LoadResult<Self> {
        let require_key = || {
            if spec.primary_key.is_empty() {
                Err(LoadError::invalid_spec(
                    spec.table.to_string(),
                    format!("strategy {} requires a primary key", spec.strategy),
                ))
            } else {
                Ok(spec.primary_key.clone())
            }
        };
        match spec.strategy {
            StrategyKind::AppendSkip => Ok(WritePlan::AppendSkip {
                key_columns: require_key()?,
            }),
            StrategyKind::Upsert => {
                let key_columns = require_key()?;
                let update_columns = spec
                    .columns
                    .iter()
                    .filter(|c| !spec.is_key_column(&c.name))
                    .map(|c| c.name.clone())
                    .collect();
                Ok(WritePlan::Upsert {
                    key_columns,
                    update_columns,
                })
            }
            StrategyKind::TruncateReload => Ok(WritePlan::TruncateReload),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            WritePlan::AppendSkip { .. } => StrategyKind::AppendSkip,
            WritePlan::Upsert { .. } => StrategyKind::Upsert,
            WritePlan::TruncateReload => StrategyKind::TruncateReload,
        }
    }

    pub fn key_columns(&self) -> &[String] {
        match self {
            WritePlan::AppendSkip { key_columns } | WritePlan::Upsert { key_columns, .. } => {
                key_columns
            }
            WritePlan::TruncateReload => &[],
        }
    }

    pub fn truncates_first(&self) -> bool {
        matches!(self, WritePlan::TruncateReload)
    }

    /// Parameterized insert statement for one row. Parameters are bound as
    /// text and cast to each column's declared type.
    pub fn write_template(&self, spec: &TableSpec) -> String {
        let columns = spec.columns.iter().map(|c| c.name.as_str()).join(", ");
        let values = spec
            .columns
            .iter()
            .enumerate()
            .map(|(idx, c)| format!("${}::text::{}", idx + 1, c.sql_type.trim()))
            .join(", ");
        let conflict = match self {
            WritePlan::AppendSkip { key_columns } => {
                format!(" ON CONFLICT ({}) DO NOTHING", key_columns.join(", "))
            }
            WritePlan::Upsert {
                key_columns,
                update_columns,
            } if update_columns.is_empty() => {
                format!(" ON CONFLICT ({}) DO NOTHING", key_columns.join(", "))
            }
            WritePlan::Upsert {
                key_columns,
                update_columns,
            } => format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                key_columns.join(", "),
                update_columns
                    .iter()
                    .map(|c| format!("{c} = EXCLUDED.{c}"))
                    .join(", ")
            ),
            WritePlan::TruncateReload => String::new(),
        };
        format!(
            "INSERT INTO {} ({columns}) VALUES ({values}){conflict}",
            spec.table
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ColumnSpec, QualifiedName};

    #[test]
    fn upsert_updates_only_non_key_columns() {
        let catalog = Catalog::builtin();
        let spec = catalog.get("ft_balance_f").unwrap();
        let plan = WritePlan::resolve(spec).unwrap();
        assert_eq!(
            plan,
            WritePlan::Upsert {
                key_columns: vec!["on_date".into(), "account_rk".into()],
                update_columns: vec!["currency_rk".into(), "balance_out".into()],
            }
        );
        assert_eq!(
            plan.write_template(spec),
            "INSERT INTO ds.ft_balance_f (on_date, account_rk, currency_rk, balance_out) \
             VALUES ($1::text::date, $2::text::numeric, $3::text::numeric, $4::text::double precision) \
             ON CONFLICT (on_date, account_rk) DO UPDATE SET currency_rk = EXCLUDED.currency_rk, \
             balance_out = EXCLUDED.balance_out"
        );
    }

    #[test]
    fn truncate_reload_template_has_no_conflict_clause() {
        let catalog = Catalog::builtin();
        let spec = catalog.get("ft_posting_f").unwrap();
        let plan = WritePlan::resolve(spec).unwrap();
        assert!(plan.truncates_first());
        assert!(plan.key_columns().is_empty());
        assert!(!plan.write_template(spec).contains("ON CONFLICT"));
    }

    #[test]
    fn append_skip_requires_key() {
        let spec = TableSpec::new(
            QualifiedName::new("ds", "t"),
            StrategyKind::AppendSkip,
            vec![ColumnSpec::new("id", "integer").not_null()],
        );
        assert!(matches!(
            WritePlan::resolve(&spec),
            Err(LoadError::InvalidTableSpec { .. })
        ));
        let plan = WritePlan::resolve(&spec.with_key(&["id"])).unwrap();
        assert_eq!(plan.kind(), StrategyKind::AppendSkip);
    }

    #[test]
    fn key_only_upsert_degrades_to_do_nothing() {
        let spec = TableSpec::new(
            QualifiedName::new("ds", "t"),
            StrategyKind::Upsert,
            vec![ColumnSpec::new("id", "integer").not_null()],
        )
        .with_key(&["id"]);
        let plan = WritePlan::resolve(&spec).unwrap();
        assert!(plan.write_template(&spec).ends_with("ON CONFLICT (id) DO NOTHING"));
    }
}
