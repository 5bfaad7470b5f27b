use std::path::Path;
use std::sync::Arc;

use neurotrends_core::{
    Article, AttributeResolver, AttributeStore, DirectoryDocumentLoader, DocumentLoader,
    DocumentType, ExtractionConfig, MemoryDocumentLoader, MemoryStore, ResolveStatus, RuleBook,
    SkipReason, SqliteStore, StoreCounts, Tag,
};
use tempfile::TempDir;

const ABSTRACT: &str = "Working memory load modulates prefrontal activity.";

const RULES: &str = r#"{
    "groups": [
        {
            "name": "software",
            "category": "analysis",
            "tags": [
                {
                    "name": "spm",
                    "bool": ["\\bSPM"],
                    "versions": [
                        {"label": "8", "rules": ["SPM ?8"]},
                        {"label": "5", "rules": ["SPM ?5"]}
                    ],
                    "arbit": {
                        "src": [{"pattern": "SPM ?([vV]?\\d[\\w.]*)", "capture": "value"}],
                        "fun": "lowercase"
                    }
                },
                {"name": "fsl", "rules": ["\\bFSL\\b"]}
            ]
        },
        {
            "name": "parameters",
            "category": "acquisition",
            "tags": [
                {
                    "name": "field_strength",
                    "rules": [{"pattern": "(\\d(?:\\.\\d)?) ?T(?:esla)? scanner", "capture": "value"}]
                }
            ]
        }
    ]
}"#;

fn rules() -> Arc<RuleBook> {
    Arc::new(RuleBook::from_json(RULES).unwrap())
}

fn with_abstract(body: &str) -> String {
    format!("{ABSTRACT} {body}")
}

async fn seeded<S: AttributeStore + 'static>(store: S, abstract_text: Option<&str>) -> Arc<S> {
    let mut article = Article::new("1");
    if let Some(text) = abstract_text {
        article = article.with_abstract(text);
    }
    store.insert_article(&article).await.unwrap();
    Arc::new(store)
}

fn resolver(store: Arc<dyn AttributeStore>, loader: impl DocumentLoader + 'static) -> AttributeResolver {
    AttributeResolver::new(store, Arc::new(loader), rules())
}

fn write_documents(root: &Path, id: &str, html: &str, pdf: &str) {
    std::fs::create_dir_all(root.join("html")).unwrap();
    std::fs::create_dir_all(root.join("pdf")).unwrap();
    std::fs::write(root.join("html").join(format!("{id}.html")), html).unwrap();
    std::fs::write(root.join("pdf").join(format!("{id}.txt")), pdf).unwrap();
}

#[tokio::test]
async fn test_rerun_is_idempotent_on_sqlite() {
    let dir = TempDir::new().unwrap();
    write_documents(
        dir.path(),
        "1",
        &format!("<html><body><p>{ABSTRACT}</p><p>Analysed with SPM8 on a 3 T scanner.</p></body></html>"),
        "Working memory load modulates\nprefrontal activity. SPM8 anal-\nysis.",
    );

    let store = seeded(
        SqliteStore::open(dir.path().join("neurotrends.db")).await.unwrap(),
        Some(ABSTRACT),
    )
    .await;
    let resolver = resolver(store.clone(), DirectoryDocumentLoader::new(dir.path()));

    let first = resolver.resolve("1", None).await.unwrap();
    assert!(first.is_resolved());
    assert_eq!(first.documents, vec![DocumentType::Html, DocumentType::Pdf]);
    assert_eq!(first.scores.html, Some(1.0));
    assert_eq!(first.scores.pdf, Some(1.0));

    let counts = store.counts().await.unwrap();
    assert_eq!(
        counts,
        StoreCounts {
            articles: 1,
            fields: 4,
            attributes: 2,
            attachments: 2,
            snippets: 0,
        }
    );

    let second = resolver.resolve("1", None).await.unwrap();
    assert!(!second.stats.created_anything());
    assert_eq!(second.attribute_ids, first.attribute_ids);
    assert_eq!(store.counts().await.unwrap(), counts);
}

#[tokio::test]
async fn test_versioned_tag_in_one_document_wins() {
    let store = seeded(MemoryStore::new(), Some(ABSTRACT)).await;
    let loader = MemoryDocumentLoader::new()
        .with_text("1", DocumentType::Html, with_abstract("SPM was used throughout."))
        .with_text("1", DocumentType::Pdf, with_abstract("Data were analysed in SPM8."));

    let outcome = resolver(store, loader).resolve("1", None).await.unwrap();
    let software = outcome
        .groups
        .iter()
        .find(|g| g.name == "software")
        .unwrap();
    assert_eq!(software.tags, vec![Tag::versioned("spm", "8")]);
    assert_eq!(outcome.attribute_ids.len(), 1);
}

#[tokio::test]
async fn test_arbitrary_version_fallback() {
    let cases = [
        ("Data were analysed in SPM12 software", "12"),
        ("Analysed in SPM V1.2Beta software", "v1.2beta"),
        ("SPM8 and later SPM12 were compared", "8"),
        ("SPM was used", ""),
    ];

    for (body, expected) in cases {
        let store = seeded(MemoryStore::new(), None).await;
        let loader = MemoryDocumentLoader::new().with_text("1", DocumentType::Html, body);
        let resolver = resolver(store, loader)
            .with_config(ExtractionConfig::default().with_verify(false));

        let groups = ["software".to_string()];
        let outcome = resolver.resolve("1", Some(&groups[..])).await.unwrap();
        assert_eq!(
            outcome.groups[0].tags,
            vec![Tag::versioned("spm", expected)],
            "text: {body}"
        );
    }
}

#[tokio::test]
async fn test_empty_corpus_short_circuits() {
    let store = seeded(MemoryStore::new(), Some(ABSTRACT)).await;
    let resolver = resolver(store.clone(), MemoryDocumentLoader::new());

    let outcome = resolver.resolve("1", None).await.unwrap();
    assert_eq!(outcome.status, ResolveStatus::Skipped(SkipReason::EmptyCorpus));
    assert!(outcome.groups.is_empty());
    assert_eq!(store.counts().await.unwrap().fields, 0);

    let article = store.get_article("1").await.unwrap();
    assert_eq!(article.scores.html, None);
    assert_eq!(article.scores.pdf, None);
}

#[tokio::test]
async fn test_verification_excludes_unrelated_document() {
    let store = seeded(MemoryStore::new(), Some(ABSTRACT)).await;
    let loader = MemoryDocumentLoader::new()
        .with_text("1", DocumentType::Html, "Sign in to read this article. FSL")
        .with_text("1", DocumentType::Pdf, with_abstract("Images were processed on a 3 T scanner."));

    let outcome = resolver(store.clone(), loader).resolve("1", None).await.unwrap();
    assert_eq!(outcome.documents, vec![DocumentType::Pdf]);
    assert!(outcome.scores.html.unwrap() < 0.85);
    assert_eq!(outcome.scores.pdf, Some(1.0));

    let tags: Vec<&Tag> = outcome.groups.iter().flat_map(|g| &g.tags).collect();
    assert_eq!(tags, vec![&Tag::new("field_strength").with_field("value", "3")]);

    let article = store.get_article("1").await.unwrap();
    assert_eq!(article.scores, outcome.scores);
}

#[tokio::test]
async fn test_snippets_deduplicated_per_article() {
    let store = seeded(MemoryStore::new(), Some(ABSTRACT)).await;
    let text = with_abstract("Preprocessing used FSL.");
    let loader = MemoryDocumentLoader::new()
        .with_text("1", DocumentType::Html, text.clone())
        .with_text("1", DocumentType::Pdf, text);
    let resolver = resolver(store.clone(), loader)
        .with_config(ExtractionConfig::default().with_snippets(true));

    let first = resolver.resolve("1", None).await.unwrap();
    assert_eq!(first.stats.snippets_created, 1);

    let second = resolver.resolve("1", None).await.unwrap();
    assert_eq!(second.stats.snippets_created, 0);

    let snippets = store.article_snippets("1").await.unwrap();
    assert_eq!(snippets.len(), 1);
    assert_eq!(snippets[0].name, "software");
    assert!(snippets[0].text.contains("FSL"));
}

#[tokio::test]
async fn test_stores_agree() {
    let html = with_abstract("SPM5 and FSL on a 1.5 Tesla scanner.");
    let pdf = with_abstract("SPM was used.");
    let loader = || {
        MemoryDocumentLoader::new()
            .with_text("1", DocumentType::Html, html.clone())
            .with_text("1", DocumentType::Pdf, pdf.clone())
    };

    let memory = seeded(MemoryStore::new(), Some(ABSTRACT)).await;
    let sqlite = seeded(SqliteStore::open_memory().await.unwrap(), Some(ABSTRACT)).await;

    let from_memory = resolver(memory.clone(), loader()).resolve("1", None).await.unwrap();
    let from_sqlite = resolver(sqlite.clone(), loader()).resolve("1", None).await.unwrap();

    assert_eq!(from_memory.groups, from_sqlite.groups);
    assert_eq!(from_memory.stats, from_sqlite.stats);
    assert_eq!(memory.counts().await.unwrap(), sqlite.counts().await.unwrap());
}

#[tokio::test]
async fn test_same_tag_shares_attribute_across_articles() {
    let store = MemoryStore::new();
    store
        .insert_article(&Article::new("1").with_abstract(ABSTRACT))
        .await
        .unwrap();
    store
        .insert_article(&Article::new("2").with_abstract(ABSTRACT))
        .await
        .unwrap();
    let store = Arc::new(store);

    let loader = MemoryDocumentLoader::new()
        .with_text("1", DocumentType::Html, with_abstract("FSL"))
        .with_text("2", DocumentType::Pdf, with_abstract("FSL and SPM8"));
    let resolver = resolver(store.clone(), loader);

    let one = resolver.resolve("1", None).await.unwrap();
    let two = resolver.resolve("2", None).await.unwrap();

    assert_eq!(one.stats.attributes_created, 1);
    assert_eq!(two.stats.attributes_created, 1);
    assert!(two.attribute_ids.contains(&one.attribute_ids[0]));
    assert_eq!(store.counts().await.unwrap().attachments, 3);
}

async fn resolve_concurrently<S: AttributeStore + 'static>(store: S) -> (Arc<S>, usize) {
    const ARTICLES: usize = 40;

    let mut loader = MemoryDocumentLoader::new();
    for id in 1..=ARTICLES {
        store.insert_article(&Article::new(id.to_string())).await.unwrap();
        loader = loader.with_text(id.to_string(), DocumentType::Html, "Preprocessing used FSL.");
    }
    let store = Arc::new(store);
    let resolver = Arc::new(
        resolver(store.clone(), loader).with_config(ExtractionConfig::default().with_verify(false)),
    );

    let handles: Vec<_> = (1..=ARTICLES)
        .map(|id| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve(&id.to_string(), None).await })
        })
        .collect();

    let mut attribute_ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.is_resolved());
        attribute_ids.extend(outcome.attribute_ids);
    }
    attribute_ids.dedup();
    assert_eq!(attribute_ids.len(), 1);

    (store, ARTICLES)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolves_share_rows_in_memory() {
    let (store, articles) = resolve_concurrently(MemoryStore::new()).await;
    assert_eq!(
        store.counts().await.unwrap(),
        StoreCounts {
            articles: articles as u64,
            fields: 1,
            attributes: 1,
            attachments: articles as u64,
            snippets: 0,
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolves_share_rows_on_sqlite() {
    let (store, articles) = resolve_concurrently(SqliteStore::open_memory().await.unwrap()).await;
    assert_eq!(
        store.counts().await.unwrap(),
        StoreCounts {
            articles: articles as u64,
            fields: 1,
            attributes: 1,
            attachments: articles as u64,
            snippets: 0,
        }
    );
}
