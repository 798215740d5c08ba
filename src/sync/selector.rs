use jiff::Timestamp;

use crate::api::cms::catalog::DatasetDescriptor;

/// Keep the datasets modified strictly after the watermark.  Without a
/// watermark (first run) every dataset is selected.  A dataset modified exactly
/// at the watermark was processed by an earlier run and is left out.
pub fn select_modified_since(
    descriptors: Vec<DatasetDescriptor>,
    watermark: Option<Timestamp>,
) -> Vec<DatasetDescriptor> {
    match watermark {
        None => descriptors,
        Some(w) => descriptors
            .into_iter()
            .filter(|d| d.modified_at > w)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, modified_at: &str) -> DatasetDescriptor {
        DatasetDescriptor {
            id: id.to_string(),
            themes: vec!["Hospitals".to_string()],
            modified_at: modified_at.parse().unwrap(),
            download_url: format!("https://example.org/{}.csv", id),
        }
    }

    fn ids(ds: &[DatasetDescriptor]) -> Vec<&str> {
        ds.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn first_run_selects_everything() {
        let ds = vec![
            descriptor("a", "2020-01-01T00:00:00Z"),
            descriptor("b", "2024-06-01T00:00:00Z"),
        ];
        assert_eq!(select_modified_since(ds.clone(), None), ds);
    }

    #[test]
    fn equal_to_watermark_is_excluded() {
        let ds = vec![
            descriptor("A", "2024-01-01T00:00:00Z"),
            descriptor("B", "2024-01-02T00:00:00Z"),
        ];
        let w = "2024-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(ids(&select_modified_since(ds, Some(w))), vec!["B"]);
    }

    #[test]
    fn selection_matches_predicate() {
        let ds = vec![
            descriptor("a", "2023-12-31T23:59:59Z"),
            descriptor("b", "2024-01-01T00:00:00Z"),
            descriptor("c", "2024-01-01T00:00:01Z"),
            descriptor("d", "2024-03-15T10:00:00Z"),
            descriptor("e", "2025-01-01T00:00:00Z"),
        ];
        for w in [
            "2000-01-01T00:00:00Z",
            "2024-01-01T00:00:00Z",
            "2024-02-01T00:00:00Z",
            "2025-01-01T00:00:00Z",
            "2030-01-01T00:00:00Z",
        ] {
            let w: Timestamp = w.parse().unwrap();
            let selected = select_modified_since(ds.clone(), Some(w));
            let expected: Vec<DatasetDescriptor> =
                ds.iter().filter(|d| d.modified_at > w).cloned().collect();
            assert_eq!(selected, expected, "watermark {}", w);
        }
    }

    #[test]
    fn order_is_preserved() {
        let ds = vec![
            descriptor("z", "2024-05-01T00:00:00Z"),
            descriptor("a", "2024-04-01T00:00:00Z"),
            descriptor("m", "2024-06-01T00:00:00Z"),
        ];
        let w = "2024-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(ids(&select_modified_since(ds, Some(w))), vec!["z", "a", "m"]);
    }
}
