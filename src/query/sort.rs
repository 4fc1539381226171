//! Sort and pagination placement
//!
//! The metric join reorders rows, so where sort/skip/limit go depends on
//! whether a join runs and on what it produces. The decision is made once
//! here and consumed by the assembler.

use super::fields;
use crate::pipeline::{OrderDirection, SortSpec, Stage};

/// Where sort, skip and limit are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Before the join block; the join is followed by a re-sort.
    Early,
    /// After the join block and any deferred filter.
    Late,
    /// Not emitted (count and single-document requests).
    Omitted,
}

/// Facts about the request the placement depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortContext {
    /// Count or single-document request.
    pub unpaginated: bool,
    /// The metric join runs.
    pub join: bool,
    /// The sort key is a metric column.
    pub sort_on_metric: bool,
    /// The filter only runs after the join.
    pub filter_deferred: bool,
}

/// Resolved sort and pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortPlan {
    spec: SortSpec,
    placement: Placement,
    skip: u64,
    limit: u64,
    resort_after_join: bool,
}

impl SortPlan {
    /// Decide sort keys and placement.
    ///
    /// `sort_field` is the resolved stored field; `None` sorts by run id.
    /// Run id is always the last key so equal values page deterministically.
    #[must_use]
    pub fn plan(
        sort_field: Option<&str>,
        direction: OrderDirection,
        skip: u64,
        limit: u64,
        context: SortContext,
    ) -> Self {
        let spec = SortSpec::by(sort_field.unwrap_or(fields::ID), direction)
            .then_by(fields::ID, direction);
        let placement = if context.unpaginated {
            Placement::Omitted
        } else if context.sort_on_metric || context.filter_deferred {
            Placement::Late
        } else {
            Placement::Early
        };
        Self {
            spec,
            placement,
            skip,
            limit,
            resort_after_join: placement == Placement::Early && context.join,
        }
    }

    /// Sort keys in priority order.
    #[must_use]
    pub const fn spec(&self) -> &SortSpec {
        &self.spec
    }

    /// Chosen placement.
    #[must_use]
    pub const fn placement(&self) -> Placement {
        self.placement
    }

    /// Whether the join block must be followed by a re-sort.
    #[must_use]
    pub const fn resort_after_join(&self) -> bool {
        self.resort_after_join
    }

    fn paginate(&self) -> Vec<Stage> {
        let mut stages = vec![Stage::Sort(self.spec.clone())];
        if self.skip > 0 {
            stages.push(Stage::Skip(self.skip));
        }
        stages.push(Stage::Limit(self.limit));
        stages
    }

    /// Stages placed before the join block.
    #[must_use]
    pub fn early_stages(&self) -> Vec<Stage> {
        match self.placement {
            Placement::Early => self.paginate(),
            Placement::Late | Placement::Omitted => Vec::new(),
        }
    }

    /// Stage placed right after the join block.
    #[must_use]
    pub fn resort_stage(&self) -> Option<Stage> {
        self.resort_after_join.then(|| Stage::Sort(self.spec.clone()))
    }

    /// Stages placed after the join block and deferred filter.
    #[must_use]
    pub fn late_stages(&self) -> Vec<Stage> {
        match self.placement {
            Placement::Late => self.paginate(),
            Placement::Early | Placement::Omitted => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(stages: &[Stage]) -> Vec<&'static str> {
        stages.iter().map(Stage::name).collect()
    }

    #[test]
    fn test_default_sort_is_id_descending() {
        let plan = SortPlan::plan(None, OrderDirection::Desc, 0, 200, SortContext::default());
        assert_eq!(plan.spec().keys(), [("_id".to_string(), OrderDirection::Desc)]);
        assert_eq!(plan.placement(), Placement::Early);
        assert_eq!(names(&plan.early_stages()), vec!["$sort", "$limit"]);
        assert!(plan.late_stages().is_empty());
        assert!(plan.resort_stage().is_none());
    }

    #[test]
    fn test_id_tie_break_follows_direction() {
        let plan = SortPlan::plan(Some("config.lr"), OrderDirection::Asc, 5, 10, SortContext::default());
        assert_eq!(
            plan.spec().keys(),
            [
                ("config.lr".to_string(), OrderDirection::Asc),
                ("_id".to_string(), OrderDirection::Asc)
            ]
        );
        assert_eq!(names(&plan.early_stages()), vec!["$sort", "$skip", "$limit"]);
    }

    #[test]
    fn test_join_on_plain_sort_resorts() {
        let context = SortContext {
            join: true,
            ..SortContext::default()
        };
        let plan = SortPlan::plan(Some("status"), OrderDirection::Desc, 0, 10, context);
        assert_eq!(plan.placement(), Placement::Early);
        assert!(plan.resort_stage().is_some());
    }

    #[test]
    fn test_metric_sort_is_late() {
        let context = SortContext {
            join: true,
            sort_on_metric: true,
            ..SortContext::default()
        };
        let plan = SortPlan::plan(Some("loss_min"), OrderDirection::Asc, 20, 10, context);
        assert_eq!(plan.placement(), Placement::Late);
        assert!(plan.early_stages().is_empty());
        assert!(plan.resort_stage().is_none());
        assert_eq!(names(&plan.late_stages()), vec!["$sort", "$skip", "$limit"]);
    }

    #[test]
    fn test_deferred_filter_is_late() {
        let context = SortContext {
            join: true,
            filter_deferred: true,
            ..SortContext::default()
        };
        let plan = SortPlan::plan(None, OrderDirection::Desc, 0, 10, context);
        assert_eq!(plan.placement(), Placement::Late);
    }

    #[test]
    fn test_unpaginated_emits_nothing() {
        let context = SortContext {
            unpaginated: true,
            join: true,
            sort_on_metric: true,
            filter_deferred: true,
        };
        let plan = SortPlan::plan(Some("loss_min"), OrderDirection::Asc, 3, 10, context);
        assert_eq!(plan.placement(), Placement::Omitted);
        assert!(plan.early_stages().is_empty());
        assert!(plan.resort_stage().is_none());
        assert!(plan.late_stages().is_empty());
    }
}
