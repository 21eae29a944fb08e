//! Message-level aggregation scenarios with stubbed network collaborators

mod common;

use common::{build_pdf, test_config, RenderPlan, StubFetcher, StubRenderer};
use dealflow_extract::{
    Aggregator, ArtifactPlacement, Attachment, AttachmentSource, DocumentRef, ExtractError, FragmentSource,
    InboundMessage, NoOcr, PdfTextExtractor,
};
use std::sync::Arc;

fn aggregator(config: dealflow_extract::ExtractorConfig, fetcher: Arc<StubFetcher>, renderer: Arc<StubRenderer>) -> Aggregator {
    Aggregator::new(config)
        .unwrap()
        .with_fetcher(fetcher)
        .with_renderer(renderer)
        .with_pdf_extractor(PdfTextExtractor::new(2, Arc::new(NoOcr)))
}

#[tokio::test]
async fn test_single_link_end_to_end() {
    let temp = tempfile::tempdir().unwrap();
    let link = "https://docs.example/view/abc123";
    let fetcher = Arc::new(StubFetcher::single(link));
    let renderer = Arc::new(StubRenderer::new([(
        link.to_string(),
        RenderPlan::Pdf(build_pdf(&["Acme raises $2,000,000"])),
    )]));

    let message = InboundMessage::from_text(format!("Check out Acme: {}", link));
    let extraction = aggregator(test_config(temp.path(), "docs.example"), fetcher, renderer)
        .extract(&message)
        .await
        .unwrap();

    assert!(extraction.corpus.contains("Check out Acme: https://docs.example/view/abc123"));
    assert!(extraction.corpus.contains("Acme raises $2,000,000"));
    assert_eq!(extraction.artifacts().len(), 1);
    assert!(extraction.artifacts()[0].exists());
    assert!(extraction.failures.is_empty());
    assert_eq!(extraction.links, vec![link.to_string()]);
}

#[tokio::test]
async fn test_dataroom_contains_failing_document() {
    let temp = tempfile::tempdir().unwrap();
    let room = "https://docs.example/view/s/room42";
    let names = ["deck", "model", "memo", "cap-table"];

    let mut fetcher = StubFetcher::default();
    fetcher.dataroom = true;
    fetcher.resolved.insert(
        room.to_string(),
        names
            .iter()
            .map(|name| DocumentRef {
                url: format!("{}/d/{}", room, name),
                name: name.to_string(),
            })
            .collect(),
    );

    let renderer = Arc::new(StubRenderer::new(names.iter().map(|name| {
        let plan = if *name == "model" {
            RenderPlan::Fail(502)
        } else {
            RenderPlan::Pdf(build_pdf(&[&format!("{} contents", name)]))
        };
        (format!("{}/d/{}", room, name), plan)
    })));

    let message = InboundMessage::from_text(format!("Room: {}", room));
    let extraction = aggregator(test_config(temp.path(), "docs.example"), Arc::new(fetcher), renderer.clone())
        .extract(&message)
        .await
        .unwrap();

    assert_eq!(renderer.calls.lock().unwrap().len(), 4);
    assert_eq!(extraction.fragments.len(), 3);
    assert_eq!(extraction.artifacts().len(), 3);
    assert_eq!(extraction.failures.len(), 1);
    assert!(extraction.failures[0].job.contains("/d/model"));
    for name in ["deck", "memo", "cap-table"] {
        assert!(extraction.corpus.contains(&format!("{} contents", name)), "missing {}", name);
    }
    assert!(!extraction.corpus.contains("model contents"));
}

#[tokio::test]
async fn test_one_bad_link_does_not_sink_the_others() {
    let temp = tempfile::tempdir().unwrap();
    let good = "https://docs.example/view/good";
    let bad = "https://docs.example/view/bad";

    let mut fetcher = StubFetcher::single(good);
    fetcher.failing.insert(bad.to_string(), || ExtractError::MissingCsrfToken("no token".into()));
    let renderer = Arc::new(StubRenderer::new([(
        good.to_string(),
        RenderPlan::Pdf(build_pdf(&["Good deck"])),
    )]));

    let message = InboundMessage::from_text(format!("{} and {}", good, bad));
    let extraction = aggregator(test_config(temp.path(), "docs.example"), Arc::new(fetcher), renderer)
        .extract(&message)
        .await
        .unwrap();

    assert!(extraction.corpus.contains("Good deck"));
    assert_eq!(extraction.failures.len(), 1);
    assert_eq!(extraction.failures[0].job, bad);
}

#[tokio::test]
async fn test_redirect_to_media_host_is_excluded() {
    let temp = tempfile::tempdir().unwrap();
    let video = "https://docs.example/view/video";
    let deck = "https://docs.example/view/deck";

    let mut fetcher = StubFetcher::single(deck);
    fetcher
        .redirects
        .insert(video.to_string(), "https://www.youtube.com/watch?v=abc".to_string());
    let fetcher = Arc::new(fetcher);
    let renderer = Arc::new(StubRenderer::new([(
        deck.to_string(),
        RenderPlan::Pdf(build_pdf(&["Deck text"])),
    )]));

    let message = InboundMessage::from_text(format!("{} {}", video, deck));
    let extraction = aggregator(test_config(temp.path(), "docs.example"), fetcher.clone(), renderer)
        .extract(&message)
        .await
        .unwrap();

    assert_eq!(extraction.links, vec![deck.to_string()]);
    assert_eq!(*fetcher.fetched.lock().unwrap(), vec![deck.to_string()]);
    assert!(extraction.failures.is_empty());
}

#[tokio::test]
async fn test_non_pdf_render_output_is_a_failure() {
    let temp = tempfile::tempdir().unwrap();
    let link = "https://docs.example/view/abc123";
    let fetcher = Arc::new(StubFetcher::single(link));
    let renderer = Arc::new(StubRenderer::new([(link.to_string(), RenderPlan::Html)]));

    let message = InboundMessage::from_text(format!("Deck {}", link));
    let extraction = aggregator(test_config(temp.path(), "docs.example"), fetcher, renderer)
        .extract(&message)
        .await
        .unwrap();

    assert!(extraction.artifacts().is_empty());
    assert_eq!(extraction.failures.len(), 1);
    let work_dir = extraction.work_dir().to_path_buf();
    assert_eq!(std::fs::read_dir(&work_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_slow_document_times_out_alone() {
    let temp = tempfile::tempdir().unwrap();
    let fast = "https://docs.example/view/fast";
    let slow = "https://docs.example/view/slow";

    let mut fetcher = StubFetcher::single(fast);
    fetcher.resolved.insert(
        slow.to_string(),
        vec![DocumentRef {
            url: slow.to_string(),
            name: "slow".into(),
        }],
    );
    let renderer = Arc::new(StubRenderer::new([
        (fast.to_string(), RenderPlan::Pdf(build_pdf(&["Fast deck"]))),
        (slow.to_string(), RenderPlan::Hang),
    ]));

    let mut config = test_config(temp.path(), "docs.example");
    config.job_timeout_secs = 1;

    let message = InboundMessage::from_text(format!("{} {}", fast, slow));
    let extraction = aggregator(config, Arc::new(fetcher), renderer)
        .extract(&message)
        .await
        .unwrap();

    assert!(extraction.corpus.contains("Fast deck"));
    assert_eq!(extraction.failures.len(), 1);
    assert!(extraction.failures[0].error.contains("timeout"));
}

#[tokio::test]
async fn test_verification_is_flagged() {
    let temp = tempfile::tempdir().unwrap();
    let link = "https://docs.example/view/locked";
    let mut fetcher = StubFetcher::default();
    fetcher.failing.insert(link.to_string(), || ExtractError::VerificationRequired {
        url: "https://docs.example/view/locked".into(),
    });
    let renderer = Arc::new(StubRenderer::new([]));

    let message = InboundMessage::from_text(link);
    let extraction = aggregator(test_config(temp.path(), "docs.example"), Arc::new(fetcher), renderer)
        .extract(&message)
        .await
        .unwrap();

    assert!(extraction.needs_verification());
}

#[tokio::test]
async fn test_nothing_usable_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let message = InboundMessage::default().with_document(Attachment {
        file_name: "photo.jpg".into(),
        mime_type: Some("image/jpeg".into()),
        source: AttachmentSource::Bytes(vec![0xff, 0xd8]),
    });

    let result = aggregator(
        test_config(temp.path(), "docs.example"),
        Arc::new(StubFetcher::default()),
        Arc::new(StubRenderer::new([])),
    )
    .extract(&message)
    .await;

    assert!(matches!(result, Err(ExtractError::NoContent(_))));
    // The failed call leaves no work directory behind
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_attachment_is_extracted_and_placed() {
    let temp = tempfile::tempdir().unwrap();
    let message = InboundMessage::from_text("fwd from founder").with_document(Attachment {
        file_name: "Acme Deck.pdf".into(),
        mime_type: Some("application/pdf".into()),
        source: AttachmentSource::Bytes(build_pdf(&["Acme team slide"])),
    });

    let extraction = aggregator(
        test_config(&temp.path().join("work"), "docs.example"),
        Arc::new(StubFetcher::default()),
        Arc::new(StubRenderer::new([])),
    )
    .extract(&message)
    .await
    .unwrap();

    assert_eq!(
        extraction.fragments[0].source,
        FragmentSource::Attachment {
            file_name: "Acme Deck.pdf".into()
        }
    );
    assert!(extraction.corpus.starts_with("fwd from founder\n\n"));
    assert!(extraction.corpus.contains("Acme team slide"));

    let work_dir = extraction.work_dir().to_path_buf();
    let placement = ArtifactPlacement::new(temp.path().join("accounts"));
    let report = placement.place_extraction("Acme", extraction).await.unwrap();

    assert_eq!(report.placed.len(), 1);
    assert!(placement.account_dir("Acme").join("Acme_Deck.pdf").exists());
    assert!(!work_dir.exists());
}
