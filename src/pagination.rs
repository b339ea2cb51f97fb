use futures::{Stream, TryStreamExt};
use serde_json::Value;

/// Collects the `item_key` arrays of every page into one ordered list.
///
/// Pages are consumed in order; a page without `item_key` contributes nothing.
/// The first failing page aborts the walk and its error is returned.
pub async fn flatten_list_results<S, E>(pages: S, item_key: &str) -> Result<Vec<Value>, E>
where
    S: Stream<Item = Result<Value, E>>,
{
    pages
        .try_fold(Vec::new(), |mut items, mut page| async move {
            if let Some(Value::Array(page_items)) = page.get_mut(item_key).map(Value::take) {
                items.extend(page_items);
            }
            Ok(items)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        let pages = stream::iter(Vec::<Result<Value, ()>>::new());
        assert_eq!(flatten_list_results(pages, "services").await, Ok(vec![]));
    }

    #[tokio::test]
    async fn keeps_page_and_item_order() {
        let pages = stream::iter(vec![
            Ok::<_, ()>(json!({"services": ["a", "b"]})),
            Ok(json!({"services": []})),
            Ok(json!({"nextPageToken": "t3"})),
            Ok(json!({"services": ["c"]})),
        ]);
        assert_eq!(
            flatten_list_results(pages, "services").await,
            Ok(vec![json!("a"), json!("b"), json!("c")])
        );
    }

    #[tokio::test]
    async fn failing_page_discards_collected_items() {
        let pages = stream::iter(vec![
            Ok(json!({"services": ["a"]})),
            Err("page 2 failed"),
            Ok(json!({"services": ["c"]})),
        ]);
        assert_eq!(
            flatten_list_results(pages, "services").await,
            Err("page 2 failed")
        );
    }
}
