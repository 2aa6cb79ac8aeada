//! Reduction of raw provider records into the compact summary that is stored.

use std::collections::HashMap;

use crate::payload::{CategoryCount, CrimeSummary};

/// Number of categories kept in a crime summary.
pub const TOP_CATEGORY_COUNT: usize = 3;

/// Granularity label for police.uk street-level data.
pub const CRIME_PERIOD_LABEL: &str = "Latest available month";

/// Standing caveat attached to every crime summary.
pub const CRIME_DISCLAIMER: &str = "Area-based anonymised data; not property-specific.";

/// Summarize crime incidents by their category labels.
///
/// Counts every record, groups by category and keeps the
/// [`TOP_CATEGORY_COUNT`] largest groups. Equal counts keep the order in
/// which their category was first seen.
pub fn summarize_crime_categories<'a, I>(categories: I) -> CrimeSummary
where
    I: IntoIterator<Item = &'a str>,
{
    let mut total = 0usize;
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<CategoryCount> = Vec::new();

    for category in categories {
        total += 1;
        if let Some(&i) = index.get(category) {
            groups[i].count += 1;
        } else {
            index.insert(category, groups.len());
            groups.push(CategoryCount {
                name: category.to_owned(),
                count: 1,
            });
        }
    }

    // `sort_by` is stable, so ties stay in first-seen order.
    groups.sort_by(|a, b| b.count.cmp(&a.count));
    groups.truncate(TOP_CATEGORY_COUNT);

    CrimeSummary {
        period: CRIME_PERIOD_LABEL.to_string(),
        total_crimes: total,
        top_categories: groups,
        disclaimer: CRIME_DISCLAIMER.to_string(),
    }
}
