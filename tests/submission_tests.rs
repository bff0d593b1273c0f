mod common;

use common::{depth_image, test_video, MockService, DEPTH_GIF, FRAME_JPEG};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use xperi3d_upload::{
    Endpoint, ImageAsset, MissingField, SubmissionError, SubmitStrategy, Submitter,
};

fn thumbnail() -> ImageAsset {
    ImageAsset::new("image/jpeg", FRAME_JPEG)
}

#[tokio::test]
async fn test_submit_without_video_makes_no_calls() {
    let service = Arc::new(MockService::new());
    let submitter = Submitter::new(service.clone(), SubmitStrategy::Concurrent);

    let err = submitter.submit(None, Some(&thumbnail())).await.unwrap_err();

    assert_eq!(err, SubmissionError::MissingInput(MissingField::Video));
    assert_eq!(service.depth_count(), 0);
    assert_eq!(service.describe_count(), 0);
}

#[tokio::test]
async fn test_submit_without_thumbnail_makes_no_calls() {
    let service = Arc::new(MockService::new());
    let submitter = Submitter::new(service.clone(), SubmitStrategy::Concurrent);
    let video = test_video("kitchen.mp4");

    let err = submitter.submit(Some(&video), None).await.unwrap_err();
    assert_eq!(err, SubmissionError::MissingInput(MissingField::Thumbnail));

    // An empty thumbnail counts as missing
    let empty = ImageAsset::new("image/jpeg", Vec::<u8>::new());
    let err = submitter.submit(Some(&video), Some(&empty)).await.unwrap_err();
    assert_eq!(err, SubmissionError::MissingInput(MissingField::Thumbnail));

    assert_eq!(service.depth_count(), 0);
    assert_eq!(service.describe_count(), 0);
}

#[tokio::test]
async fn test_submit_success_returns_exact_artifacts() {
    let service = Arc::new(MockService::new());
    service.set_describe(Ok("Sunlit attic with slanted ceilings".to_string()));
    let submitter = Submitter::new(service.clone(), SubmitStrategy::Concurrent);

    let result = submitter
        .submit(Some(&test_video("attic.mp4")), Some(&thumbnail()))
        .await
        .unwrap();

    assert_eq!(result.description, "Sunlit attic with slanted ceilings");
    assert_eq!(result.processed_image.bytes().as_ref(), DEPTH_GIF);
    assert_eq!(result.processed_image, depth_image());
    assert_eq!(service.depth_count(), 1);
    assert_eq!(service.describe_count(), 1);
    assert_eq!(service.thumbnails.lock().unwrap()[0], thumbnail());
}

#[tokio::test]
async fn test_sequential_depth_failure_skips_description() {
    let service = Arc::new(MockService::new().fail_depth(500));
    let submitter = Submitter::new(service.clone(), SubmitStrategy::Sequential);

    let err = submitter
        .submit(Some(&test_video("garage.mp4")), Some(&thumbnail()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SubmissionError::RemoteService {
            endpoint: Endpoint::DepthAnalysis,
            status: 500
        }
    );
    assert_eq!(service.depth_count(), 1);
    assert_eq!(service.describe_count(), 0);
}

#[tokio::test]
async fn test_concurrent_depth_failure_discards_description() {
    let service = Arc::new(MockService::new().fail_depth(503));
    let submitter = Submitter::new(service.clone(), SubmitStrategy::Concurrent);

    let err = submitter
        .submit(Some(&test_video("garage.mp4")), Some(&thumbnail()))
        .await
        .unwrap_err();

    // The description call ran, but its result never surfaces
    assert_eq!(service.describe_count(), 1);
    assert_eq!(
        err,
        SubmissionError::RemoteService {
            endpoint: Endpoint::DepthAnalysis,
            status: 503
        }
    );
}

#[tokio::test]
async fn test_description_failure_discards_processed_image() {
    for strategy in [SubmitStrategy::Concurrent, SubmitStrategy::Sequential] {
        let service = Arc::new(MockService::new().fail_describe(502));
        let submitter = Submitter::new(service.clone(), strategy);

        let err = submitter
            .submit(Some(&test_video("den.mp4")), Some(&thumbnail()))
            .await
            .unwrap_err();

        assert_eq!(err.endpoint(), Some(Endpoint::Description));
        assert!(err.is_remote_failure());
        assert_eq!(service.depth_count(), 1);
    }
}

#[tokio::test]
async fn test_both_failures_report_depth_error() {
    let service = Arc::new(MockService::new().fail_depth(500).fail_describe(404));
    let submitter = Submitter::new(service.clone(), SubmitStrategy::Concurrent);

    let err = submitter
        .submit(Some(&test_video("den.mp4")), Some(&thumbnail()))
        .await
        .unwrap_err();

    assert_eq!(err.endpoint(), Some(Endpoint::DepthAnalysis));
}

#[tokio::test]
async fn test_decode_error_is_distinct_from_remote_failure() {
    let service = Arc::new(MockService::new());
    service.set_describe(Err(SubmissionError::Decode {
        endpoint: Endpoint::Description,
        message: "missing text field `description`".to_string(),
    }));
    let submitter = Submitter::new(service.clone(), SubmitStrategy::Concurrent);

    let err = submitter
        .submit(Some(&test_video("den.mp4")), Some(&thumbnail()))
        .await
        .unwrap_err();

    assert!(matches!(err, SubmissionError::Decode { .. }));
    assert!(!err.is_remote_failure());
}

#[tokio::test]
async fn test_cancelled_submission_aborts_in_flight_calls() {
    let (service, _release) = MockService::new().gated();
    let service = Arc::new(service);
    let submitter = Submitter::new(service.clone(), SubmitStrategy::Concurrent);
    let cancel = CancellationToken::new();

    let video = test_video("hall.mp4");
    let thumb = thumbnail();
    let pending = submitter.submit_cancellable(Some(&video), Some(&thumb), &cancel);
    tokio::pin!(pending);

    // Let both calls start, then cancel
    tokio::select! {
        _ = &mut pending => panic!("gated calls must not finish"),
        _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
    }
    cancel.cancel();

    assert_eq!(pending.await.unwrap_err(), SubmissionError::Cancelled);
    assert_eq!(service.depth_count(), 1);
    assert_eq!(service.describe_count(), 1);
}
