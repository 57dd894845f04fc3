use crate::types::{CandidateRecord, RetainedItem};

/// Groups consecutive same-author candidates connected by the rendered
/// continuation marker into threads; everything else passes through as
/// singletons. Grouping is visual-adjacency only; it knows nothing about
/// true conversational threading beyond what the marker implies.
pub fn reconstruct(candidates: Vec<CandidateRecord>) -> Vec<RetainedItem> {
    let mut out = Vec::new();
    let mut pending: Vec<CandidateRecord> = Vec::new();

    for candidate in candidates {
        if extends_pending(&pending, &candidate) {
            pending.push(candidate);
        } else {
            flush(&mut out, std::mem::take(&mut pending));
            pending.push(candidate);
        }
    }
    flush(&mut out, pending);

    out
}

fn extends_pending(pending: &[CandidateRecord], candidate: &CandidateRecord) -> bool {
    let Some(last) = pending.last() else {
        return false;
    };
    if !candidate.continues_previous {
        return false;
    }
    match (last.author.as_deref(), candidate.author.as_deref()) {
        (Some(a), Some(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}

fn flush(out: &mut Vec<RetainedItem>, group: Vec<CandidateRecord>) {
    if group.len() >= 2 {
        let thread_items: Vec<String> = group.iter().map(|c| c.text.clone()).collect();
        for (index, member) in group.into_iter().enumerate() {
            out.push(retained(
                member,
                true,
                Some(thread_items.clone()),
                Some(index + 1),
            ));
        }
    } else if let Some(single) = group.into_iter().next() {
        out.push(retained(single, false, None, None));
    }
}

fn retained(
    candidate: CandidateRecord,
    is_thread: bool,
    thread_items: Option<Vec<String>>,
    thread_position: Option<usize>,
) -> RetainedItem {
    RetainedItem {
        text: candidate.text,
        timestamp: candidate.timestamp,
        author: candidate.author,
        is_thread,
        thread_items,
        thread_position,
        quoted_url: candidate.quoted_url,
        media_urls: candidate.media_urls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(text: &str, author: Option<&str>, continues: bool) -> CandidateRecord {
        CandidateRecord {
            text: text.to_string(),
            timestamp: None,
            author: author.map(str::to_string),
            quoted_url: None,
            media_urls: Vec::new(),
            continues_previous: continues,
        }
    }

    #[test]
    fn distinct_authors_stay_singletons() {
        let items = reconstruct(vec![
            candidate("one", Some("a"), false),
            candidate("two", Some("b"), false),
            candidate("three", Some("c"), false),
            candidate("four", Some("d"), false),
            candidate("five", Some("e"), false),
        ]);
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|item| !item.is_thread));
        assert!(items.iter().all(|item| item.thread_items.is_none()));
        assert!(items.iter().all(|item| item.thread_position.is_none()));
    }

    #[test]
    fn marked_same_author_run_becomes_one_thread() {
        let items = reconstruct(vec![
            candidate("part 1", Some("author"), false),
            candidate("part 2", Some("author"), true),
            candidate("part 3", Some("author"), true),
        ]);
        assert_eq!(items.len(), 3);
        let texts = vec![
            "part 1".to_string(),
            "part 2".to_string(),
            "part 3".to_string(),
        ];
        for (index, item) in items.iter().enumerate() {
            assert!(item.is_thread);
            assert_eq!(item.thread_items.as_ref(), Some(&texts));
            assert_eq!(item.thread_position, Some(index + 1));
        }
    }

    #[test]
    fn author_change_breaks_the_group() {
        let items = reconstruct(vec![
            candidate("part 1", Some("a"), false),
            candidate("part 2", Some("a"), true),
            candidate("interloper", Some("b"), true),
        ]);
        assert_eq!(items.len(), 3);
        assert!(items[0].is_thread);
        assert!(items[1].is_thread);
        assert_eq!(items[0].thread_items.as_ref().unwrap().len(), 2);
        assert!(!items[2].is_thread);
    }

    #[test]
    fn marker_without_matching_author_does_not_extend() {
        let items = reconstruct(vec![
            candidate("part 1", None, false),
            candidate("part 2", None, true),
        ]);
        assert!(items.iter().all(|item| !item.is_thread));
    }

    #[test]
    fn missing_marker_splits_same_author_posts() {
        let items = reconstruct(vec![
            candidate("morning post", Some("a"), false),
            candidate("evening post", Some("a"), false),
        ]);
        assert!(items.iter().all(|item| !item.is_thread));
    }

    #[test]
    fn trailing_group_is_flushed() {
        let items = reconstruct(vec![
            candidate("solo", Some("x"), false),
            candidate("tail 1", Some("y"), false),
            candidate("tail 2", Some("y"), true),
        ]);
        assert_eq!(items.len(), 3);
        assert!(!items[0].is_thread);
        assert!(items[1].is_thread);
        assert!(items[2].is_thread);
        assert_eq!(items[2].thread_position, Some(2));
    }
}
