//! Aggregation queries
//!
//! An [`AggregateQuerySet`] selects grouping fields plus named aggregate
//! expressions and groups by them. It keeps the filters, ordering, limits
//! and DISTINCT flag of the query it was derived from.

use std::fmt;
use std::ops::RangeBounds;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use crate::data::{DataSource, QueryError};
use crate::model::Model;
use crate::utils::sql::comma_join;

use super::condition::{Operand, Subquery};
use super::page::{Page, PageWindow};
use super::q::Q;
use super::queryset::{QuerySet, SelectSql, count_subquery};

/// Ad-hoc row of an aggregation: output column name to JSON value
pub type AggregateRow = serde_json::Map<String, serde_json::Value>;

/// Grouped SELECT derived from a [`QuerySet`]
pub struct AggregateQuerySet<M: Model, S: DataSource> {
    base: QuerySet<M, S>,
    grouping_fields: Vec<String>,
    calculated_fields: IndexMap<String, String>,
    group_by: Vec<String>,
    with_totals: bool,
}

impl<M: Model, S: DataSource> Clone for AggregateQuerySet<M, S> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            grouping_fields: self.grouping_fields.clone(),
            calculated_fields: self.calculated_fields.clone(),
            group_by: self.group_by.clone(),
            with_totals: self.with_totals,
        }
    }
}

impl<M: Model, S: DataSource> fmt::Debug for AggregateQuerySet<M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateQuerySet")
            .field("base", &self.base)
            .field("grouping_fields", &self.grouping_fields)
            .field("calculated_fields", &self.calculated_fields)
            .field("group_by", &self.group_by)
            .field("with_totals", &self.with_totals)
            .finish()
    }
}

impl<M: Model, S: DataSource> AggregateQuerySet<M, S> {
    pub(crate) fn new(
        base: &QuerySet<M, S>,
        grouping_fields: Vec<String>,
        calculated_fields: IndexMap<String, String>,
    ) -> Result<Self, QueryError> {
        if calculated_fields.is_empty() {
            return Err(QueryError::invalid_argument(
                "no calculated fields specified for aggregation",
            ));
        }
        let inherited = base.without_projection_and_final();
        Ok(Self {
            base: inherited,
            group_by: grouping_fields.clone(),
            grouping_fields,
            calculated_fields,
            with_totals: false,
        })
    }

    fn with_base(&self, base: QuerySet<M, S>) -> Self {
        Self {
            base,
            ..self.clone()
        }
    }

    // ==================== Derivation ====================

    /// Group by a subset of the grouping fields and calculated names
    pub fn group_by<I, T>(&self, names: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if let Some(unknown) = names.iter().find(|name| {
            !self.grouping_fields.contains(*name) && !self.calculated_fields.contains_key(*name)
        }) {
            return Err(QueryError::invalid_argument(format!(
                "cannot group by `{}` since it is not included in the query",
                unknown
            )));
        }
        Ok(Self {
            group_by: names,
            ..self.clone()
        })
    }

    /// Add `WITH TOTALS` to the GROUP BY clause
    pub fn with_totals(&self) -> Self {
        Self {
            with_totals: true,
            ..self.clone()
        }
    }

    pub fn filter(&self, q: Q) -> Self {
        self.with_base(self.base.filter(q))
    }

    pub fn exclude(&self, q: Q) -> Self {
        self.with_base(self.base.exclude(q))
    }

    pub fn prewhere(&self, q: Q) -> Self {
        self.with_base(self.base.prewhere(q))
    }

    pub fn prewhere_exclude(&self, q: Q) -> Self {
        self.with_base(self.base.prewhere_exclude(q))
    }

    pub fn order_by<I, T>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.with_base(self.base.order_by(fields))
    }

    pub fn distinct(&self) -> Self {
        self.with_base(self.base.distinct())
    }

    pub fn slice(&self, range: impl RangeBounds<i64>) -> Result<Self, QueryError> {
        Ok(self.with_base(self.base.slice(range)?))
    }

    /// Not available: the projection is fixed by the aggregation
    pub fn only<I, T>(&self, _fields: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Err(QueryError::unsupported(
            "cannot use only() with an aggregate query",
        ))
    }

    /// Not available: aggregate queries cannot be re-aggregated
    pub fn aggregate<G, GI, C, K, V>(
        &self,
        _grouping_fields: G,
        _calculated_fields: C,
    ) -> Result<Self, QueryError>
    where
        G: IntoIterator<Item = GI>,
        GI: Into<String>,
        C: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Err(QueryError::unsupported(
            "cannot re-aggregate an aggregate query",
        ))
    }

    // ==================== Rendering ====================

    fn projection(&self) -> String {
        let calculated = self
            .calculated_fields
            .iter()
            .map(|(name, expr)| format!("{} AS {}", expr, name));
        comma_join(self.grouping_fields.iter().cloned().chain(calculated))
    }

    pub fn as_sql(&self) -> Result<String, QueryError> {
        SelectSql {
            distinct: self.base.is_distinct(),
            projection: self.projection(),
            table: M::table_name(),
            is_final: false,
            prewhere: self.base.prewhere_condition(),
            where_q: self.base.where_condition(),
            group_by: &self.group_by,
            with_totals: self.with_totals,
            ordering: self.base.ordering(),
            limits: self.base.limits(),
        }
        .render(M::fields())
    }

    // ==================== Execution ====================

    /// Fetch aggregated rows as JSON maps
    pub async fn fetch(&self) -> Result<Vec<AggregateRow>, QueryError> {
        self.fetch_as::<AggregateRow>().await
    }

    /// Fetch aggregated rows decoded into `T`
    pub async fn fetch_as<T>(&self) -> Result<Vec<T>, QueryError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let sql = self.as_sql()?;
        tracing::trace!(table = M::table_name(), sql = %sql, "Fetching aggregate rows");
        self.base.source().select::<T>(&sql).await
    }

    /// Number of rows after aggregation
    pub async fn count(&self) -> Result<u64, QueryError> {
        count_subquery(self.base.source().as_ref(), &self.as_sql()?).await
    }

    /// Fetch one page of aggregated rows; `-1` is the last page
    pub async fn paginate(
        &self,
        page_num: i64,
        page_size: u64,
    ) -> Result<Page<AggregateRow>, QueryError> {
        if page_size == 0 {
            return Err(QueryError::invalid_argument("page size must be positive"));
        }
        let count = self.count().await?;
        let window = PageWindow::resolve(page_num, page_size, count)?;
        let page = self.with_base(self.base.with_limits(window.offset, page_size));
        let objects = page.fetch().await?;
        Ok(window.into_page(objects, count, page_size))
    }

    // ==================== Accessors ====================

    pub fn grouping_fields(&self) -> &[String] {
        &self.grouping_fields
    }

    pub fn calculated_fields(&self) -> &IndexMap<String, String> {
        &self.calculated_fields
    }

    pub fn group_by_fields(&self) -> &[String] {
        &self.group_by
    }

    pub fn is_with_totals(&self) -> bool {
        self.with_totals
    }
}

impl<M: Model, S: DataSource> Subquery for AggregateQuerySet<M, S> {
    fn as_sql(&self) -> Result<String, QueryError> {
        AggregateQuerySet::as_sql(self)
    }

    fn box_clone(&self) -> Box<dyn Subquery> {
        Box::new(self.clone())
    }
}

impl<M: Model, S: DataSource> From<AggregateQuerySet<M, S>> for Operand {
    fn from(qs: AggregateQuerySet<M, S>) -> Self {
        Operand::subquery(qs)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::Deserialize;

    use super::*;
    use crate::q;
    use crate::testing::{MemorySource, Person, Visit};

    fn people() -> QuerySet<Person, MemorySource> {
        Person::objects_in(Arc::new(MemorySource::new()))
    }

    #[test]
    fn test_projection_and_group_by() {
        let qs = people()
            .filter(q!(height__gt = 1.5))
            .aggregate(
                ["first_name"],
                [("heaviest", "max(height)"), ("total", "count()")],
            )
            .unwrap();
        assert_eq!(
            qs.as_sql().unwrap(),
            "SELECT first_name, max(height) AS heaviest, count() AS total\n\
             FROM `person`\n\
             WHERE height > 1.5\n\
             GROUP BY `first_name`"
        );
    }

    #[test]
    fn test_calculated_fields_keep_insertion_order() {
        let qs = people()
            .aggregate(Vec::<String>::new(), [("z", "count()"), ("a", "min(height)")])
            .unwrap();
        assert_eq!(
            qs.as_sql().unwrap(),
            "SELECT count() AS z, min(height) AS a\nFROM `person`"
        );
    }

    #[test]
    fn test_requires_calculated_fields() {
        let err = people()
            .aggregate(["first_name"], Vec::<(String, String)>::new())
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_inherits_base_state_except_final() {
        let base = Visit::objects_in(Arc::new(MemorySource::new()))
            .prewhere(q!(sign = 1))
            .order_by(["-id"])
            .only(["id"])
            .distinct()
            .slice(0..10)
            .unwrap()
            .final_()
            .unwrap();
        let qs = base.aggregate(["id"], [("n", "count()")]).unwrap();
        assert_eq!(
            qs.as_sql().unwrap(),
            "SELECT DISTINCT id, count() AS n\n\
             FROM `visit`\n\
             PREWHERE sign = 1\n\
             GROUP BY `id`\n\
             ORDER BY id DESC\n\
             LIMIT 0, 10"
        );
    }

    #[test]
    fn test_group_by_narrowing_and_totals() {
        let qs = people()
            .aggregate(["first_name", "last_name"], [("n", "count()")])
            .unwrap();
        let narrowed = qs.group_by(["first_name"]).unwrap().with_totals();
        assert!(
            narrowed
                .as_sql()
                .unwrap()
                .ends_with("\nGROUP BY `first_name` WITH TOTALS")
        );
        assert_eq!(qs.group_by_fields(), ["first_name", "last_name"]);
        assert!(qs.group_by(["n"]).is_ok());
    }

    #[test]
    fn test_group_by_unknown_name() {
        let qs = people()
            .aggregate(["first_name"], [("n", "count()")])
            .unwrap();
        assert!(matches!(
            qs.group_by(["height"]),
            Err(QueryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_only_and_aggregate_are_unsupported() {
        let qs = people()
            .aggregate(["first_name"], [("n", "count()")])
            .unwrap();
        assert!(matches!(
            qs.only(["first_name"]),
            Err(QueryError::Unsupported(_))
        ));
        assert!(matches!(
            qs.aggregate(["first_name"], [("m", "count()")]),
            Err(QueryError::Unsupported(_))
        ));
    }

    #[test]
    fn test_derivations_return_aggregates() {
        let qs = people()
            .aggregate(["first_name"], [("n", "count()")])
            .unwrap()
            .exclude(q!(first_name = "x"))
            .prewhere(q!(height__gt = 1))
            .order_by(["-n"])
            .slice(..5)
            .unwrap();
        assert_eq!(
            qs.as_sql().unwrap(),
            "SELECT first_name, count() AS n\n\
             FROM `person`\n\
             PREWHERE height > 1\n\
             WHERE NOT (first_name = 'x')\n\
             GROUP BY `first_name`\n\
             ORDER BY n DESC\n\
             LIMIT 0, 5"
        );
    }

    #[tokio::test]
    async fn test_count_always_uses_subquery() {
        let source = MemorySource::people(4);
        let qs = Person::objects_in(source.clone())
            .aggregate(["first_name"], [("n", "count()")])
            .unwrap();
        assert_eq!(qs.count().await.unwrap(), 4);
        assert!(
            source
                .last_statement()
                .unwrap()
                .starts_with("SELECT count() FROM (SELECT first_name, count() AS n")
        );
    }

    #[tokio::test]
    async fn test_fetch_rows() {
        #[derive(Debug, Deserialize)]
        struct NameOnly {
            first_name: String,
        }

        let source = MemorySource::people(2);
        let qs = Person::objects_in(source)
            .aggregate(["first_name"], [("n", "count()")])
            .unwrap();

        let rows = qs.fetch().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["first_name"], "person0");

        let typed = qs.fetch_as::<NameOnly>().await.unwrap();
        assert_eq!(typed[1].first_name, "person1");
    }

    #[tokio::test]
    async fn test_paginate() {
        let source = MemorySource::people(25);
        let qs = Person::objects_in(source)
            .aggregate(["first_name"], [("n", "count()")])
            .unwrap();
        let page = qs.paginate(-1, 10).await.unwrap();
        assert_eq!(page.number, 3);
        assert_eq!(page.pages_total, 3);
        assert_eq!(page.objects.len(), 5);
    }

    #[tokio::test]
    async fn test_paginate_far_page_is_empty() {
        let source = MemorySource::people(25);
        let qs = Person::objects_in(source.clone())
            .aggregate(["first_name"], [("n", "count()")])
            .unwrap();
        let page = qs.paginate(1_000_000_000_000_000_000, 10).await.unwrap();
        assert!(page.objects.is_empty());
        assert_eq!(page.number, 1_000_000_000_000_000_000);
        assert_eq!(page.pages_total, 3);
        assert!(
            source
                .last_statement()
                .unwrap()
                .ends_with("\nLIMIT 9999999999999999990, 10")
        );

        let page = qs.paginate(i64::MAX, 10).await.unwrap();
        assert!(page.objects.is_empty());
        assert!(
            source
                .last_statement()
                .unwrap()
                .ends_with(&format!("\nLIMIT {}, 10", u64::MAX))
        );
    }
}
