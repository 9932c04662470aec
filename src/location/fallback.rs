//! Built-in country and region table for offline use

use super::{Country, Region};

const COUNTRIES: &[(&str, &str, &[&str], &str)] = &[
    ("US", "United States", &[".us", ".com", ".net", ".org"], "🇺🇸"),
    ("UK", "United Kingdom", &[".uk", ".co.uk", ".org.uk"], "🇬🇧"),
    ("CA", "Canada", &[".ca"], "🇨🇦"),
    ("AU", "Australia", &[".au", ".com.au"], "🇦🇺"),
    ("DE", "Germany", &[".de"], "🇩🇪"),
    ("FR", "France", &[".fr"], "🇫🇷"),
    ("JP", "Japan", &[".jp"], "🇯🇵"),
    ("IN", "India", &[".in", ".co.in"], "🇮🇳"),
];

const REGIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "US",
        &[
            ("CA", "California"),
            ("NY", "New York"),
            ("TX", "Texas"),
            ("FL", "Florida"),
            ("IL", "Illinois"),
            ("WA", "Washington"),
            ("MA", "Massachusetts"),
            ("CO", "Colorado"),
        ],
    ),
    (
        "UK",
        &[
            ("ENG", "England"),
            ("SCT", "Scotland"),
            ("WLS", "Wales"),
            ("NIR", "Northern Ireland"),
        ],
    ),
    (
        "CA",
        &[
            ("ON", "Ontario"),
            ("BC", "British Columbia"),
            ("QC", "Quebec"),
            ("AB", "Alberta"),
            ("MB", "Manitoba"),
            ("SK", "Saskatchewan"),
        ],
    ),
    (
        "AU",
        &[
            ("NSW", "New South Wales"),
            ("VIC", "Victoria"),
            ("QLD", "Queensland"),
            ("WA", "Western Australia"),
            ("SA", "South Australia"),
        ],
    ),
];

/// Built-in countries, sorted by name
pub fn countries() -> Vec<Country> {
    let mut list: Vec<Country> = COUNTRIES
        .iter()
        .map(|(code, name, tlds, flag)| Country {
            code: (*code).to_string(),
            name: (*name).to_string(),
            tlds: tlds.iter().map(|t| (*t).to_string()).collect(),
            flag: Some((*flag).to_string()),
        })
        .collect();
    list.sort_by(|a, b| a.name.cmp(&b.name));
    list
}

/// Built-in regions for `country_code`; empty for countries without a table
pub fn regions(country_code: &str) -> Vec<Region> {
    REGIONS
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(country_code))
        .map(|(code, regions)| {
            regions
                .iter()
                .map(|(region, name)| Region {
                    code: (*region).to_string(),
                    name: (*name).to_string(),
                    country_code: (*code).to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countries_sorted_by_name() {
        let names: Vec<_> = countries().into_iter().map(|c| c.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_us_tlds() {
        let us = countries().into_iter().find(|c| c.code == "US").unwrap();
        assert_eq!(us.tlds, vec![".us", ".com", ".net", ".org"]);
    }

    #[test]
    fn test_regions() {
        let ca = regions("CA");
        assert_eq!(ca.len(), 6);
        assert!(ca.iter().all(|r| r.country_code == "CA"));
        assert_eq!(regions("us").len(), 8);
        assert!(regions("JP").is_empty());
    }
}
