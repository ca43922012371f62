//! Copies across the whole domain catalog against in-memory stores.

use shardmove_copy::{
    copy_domain, DomainId, MemorySourceStore, MemoryTargetStore, Owner, Paging,
    PIPELINE_DOMAINS, PROJECT_DOMAINS,
};

fn expected_fetches(paging: Paging, rows: usize) -> usize {
    match paging.page_size() {
        Some(page_size) => rows / page_size + 1,
        None => 1,
    }
}

#[tokio::test]
async fn every_project_domain_copies_completely() {
    let source = MemorySourceStore::new();
    let target = MemoryTargetStore::new();
    let owner = Owner::project("proj-a");

    for (i, domain) in PROJECT_DOMAINS.iter().enumerate() {
        source.insert_rows(domain.id, &owner, i * 7 + 3);
        source.insert_rows(domain.id, &Owner::project("proj-b"), 2);
    }

    for (i, domain) in PROJECT_DOMAINS.iter().enumerate() {
        let rows = i * 7 + 3;
        let stats = copy_domain(&source, &target, domain, &owner).await.unwrap();

        assert_eq!(stats.rows, rows, "{}", domain.id);
        assert_eq!(target.row_count(domain.id), rows, "{}", domain.id);
        assert_eq!(
            source.fetch_count(domain.id),
            expected_fetches(domain.paging, rows),
            "{}",
            domain.id
        );
    }
}

#[tokio::test]
async fn pipeline_domains_stay_inside_their_pipeline() {
    let source = MemorySourceStore::new();
    let target = MemoryTargetStore::new();
    let mine = Owner::pipeline("proj", "pl-1");
    let theirs = Owner::pipeline("proj", "pl-2");

    for domain in PIPELINE_DOMAINS {
        source.insert_rows(domain.id, &mine, 11);
        source.insert_rows(domain.id, &theirs, 6);
    }

    for domain in PIPELINE_DOMAINS {
        copy_domain(&source, &target, domain, &mine).await.unwrap();
    }

    for domain in PIPELINE_DOMAINS {
        let rows = target.rows(domain.id);
        assert_eq!(rows.len(), 11, "{}", domain.id);
        assert!(rows.iter().all(|r| r.pipeline_id.as_deref() == Some("pl-1")));
    }
}

#[tokio::test]
async fn template_paging_uses_short_pages() {
    let source = MemorySourceStore::new();
    let target = MemoryTargetStore::new();
    let owner = Owner::project("proj");
    source.insert_rows(DomainId::Template, &owner, 3);

    let stats = copy_domain(&source, &target, &DomainId::Template.domain(), &owner)
        .await
        .unwrap();

    assert_eq!(stats.fetches, 1);
    assert_eq!(target.batch_count(), 1);
}
