use std::sync::Arc;

use buildmark_lib::{BucketError, BuildStatus, ComponentState, Image};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::common::{labels, test_bucket};

const COMPONENTS: usize = 12;

fn component(i: usize) -> String {
  format!("happycloud.image{i}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_components_complete_independently() {
  let (bucket, registry) = test_bucket();
  let cancel = CancellationToken::new();

  bucket.initialize(&cancel).await.unwrap();
  assert_eq!(registry.bucket.lock().as_ref().unwrap().slug, "TestBucket");

  for i in 0..COMPONENTS {
    bucket.register_build_for_component(&component(i));
  }

  let mut tasks = JoinSet::new();
  for i in 0..COMPONENTS {
    let bucket = Arc::clone(&bucket);
    let cancel = cancel.clone();
    tasks.spawn(async move {
      let name = component(i);
      bucket.create_initial_build_for_iteration(&cancel, &name).await?;
      bucket.update_labels_for_build(&name, labels(&[("source_image", format!("base-{i}").as_str())]))?;
      bucket.update_images_for_build(&name, vec![Image::new(&format!("ami-{i}"), "aws", "us-east-1")])?;
      bucket.mark_build_complete(&cancel, &name).await
    });
  }
  while let Some(result) = tasks.join_next().await {
    result.unwrap().unwrap();
  }

  assert_eq!(bucket.builds().len(), COMPONENTS);
  let records = registry.records.lock();
  for i in 0..COMPONENTS {
    let name = component(i);
    let build = bucket.build(&name).unwrap();
    assert_eq!(build.component_type(), name);
    assert_eq!(build.status(), BuildStatus::Done);
    assert_eq!(build.labels()["source_image"], format!("base-{i}"));
    assert_eq!(build.labels().len(), 3);
    assert_eq!(bucket.component_state(&name), ComponentState::Built);

    let record = &records[&name];
    assert_eq!(record.id, build.id());
    assert_eq!(record.status, BuildStatus::Done);
    assert_eq!(record.labels, build.labels());
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_label_reports_for_one_component_all_land() {
  let (bucket, _registry) = test_bucket();
  bucket.register_build_for_component("happycloud.image");
  bucket
    .create_initial_build_for_iteration(&CancellationToken::new(), "happycloud.image")
    .await
    .unwrap();

  let mut tasks = JoinSet::new();
  for stage in 0..20 {
    let bucket = Arc::clone(&bucket);
    tasks.spawn(async move {
      bucket.update_labels_for_build("happycloud.image", labels(&[(format!("stage-{stage}").as_str(), "ok")]))
    });
  }
  while let Some(result) = tasks.join_next().await {
    result.unwrap().unwrap();
  }

  let build = bucket.build("happycloud.image").unwrap();
  assert_eq!(build.labels().len(), 22);
}

#[tokio::test]
async fn state_machine_cannot_skip_registration() {
  let (bucket, _registry) = test_bucket();
  let cancel = CancellationToken::new();

  assert_eq!(bucket.component_state("happycloud.image"), ComponentState::Unregistered);
  assert!(matches!(
    bucket.update_labels_for_build("happycloud.image", labels(&[("a", "b")])),
    Err(BucketError::BuildNotFound(_))
  ));
  assert!(matches!(
    bucket.create_initial_build_for_iteration(&cancel, "happycloud.image").await,
    Err(BucketError::ComponentNotRegistered(_))
  ));

  bucket.register_build_for_component("happycloud.image");
  bucket.register_build_for_component("happycloud.image");
  assert_eq!(bucket.component_state("happycloud.image"), ComponentState::Registered);
  assert_eq!(bucket.iteration().components().len(), 1);

  bucket.create_initial_build_for_iteration(&cancel, "happycloud.image").await.unwrap();
  assert!(matches!(
    bucket.create_initial_build_for_iteration(&cancel, "happycloud.image").await,
    Err(BucketError::BuildAlreadyExists(_))
  ));
  assert_eq!(bucket.component_state("happycloud.image"), ComponentState::Built);
}

#[tokio::test]
async fn cancelled_token_prevents_registry_calls() {
  let (bucket, registry) = test_bucket();
  bucket.register_build_for_component("happycloud.image");
  let cancel = CancellationToken::new();
  cancel.cancel();

  let err = bucket
    .create_initial_build_for_iteration(&cancel, "happycloud.image")
    .await
    .unwrap_err();

  assert!(matches!(err, BucketError::Cancelled));
  assert!(registry.records.lock().is_empty());
  assert_eq!(bucket.component_state("happycloud.image"), ComponentState::Registered);
}

#[tokio::test]
async fn builds_share_iteration_identity() {
  let (bucket, _registry) = test_bucket();
  let cancel = CancellationToken::new();

  for name in ["happycloud.image", "happycloud.image2"] {
    bucket.register_build_for_component(name);
    bucket.create_initial_build_for_iteration(&cancel, name).await.unwrap();
  }

  let run_uuid = bucket.iteration().run_uuid();
  for build in bucket.builds() {
    assert_eq!(build.fingerprint(), "fp-integration");
    assert_eq!(build.run_uuid(), run_uuid);
  }
}
