// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{LogStream, ObjectKind, ObjectPayload, PodLogs, ResourceStore};
use crate::{
    errors::{KubeClientError, StoreError},
    manifest::{ScriptConfigMap, TestRunManifest, TestRunStatus},
    stage::{JobCounters, Stage},
};
use async_trait::async_trait;
use bytes::Bytes;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use futures::{AsyncBufReadExt, SinkExt, Stream, StreamExt, channel::mpsc};
use k8s_openapi::{
    api::{
        batch::v1::Job,
        core::v1::{ConfigMap, Pod},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    Api, Client, Config,
    api::{DeleteParams, DynamicObject, ListParams, LogParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, GroupVersionKind},
};
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio::task::AbortHandle;
use tracing::debug;

/// How many lines of existing output a followed log stream starts with.
const STREAM_TAIL_LINES: i64 = 100;

/// A [`ResourceStore`] backed by a Kubernetes cluster.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    namespace: String,
    test_run_resource: ApiResource,
}

impl KubeStore {
    /// Creates a store using an existing client.
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        let gvk = GroupVersionKind::gvk("k6.io", "v1alpha1", "TestRun");
        Self {
            client,
            namespace: namespace.into(),
            test_run_resource: ApiResource::from_gvk_with_plural(&gvk, "testruns"),
        }
    }

    /// Creates a store from a kubeconfig file.
    ///
    /// If `kubeconfig` is `None`, the configuration is inferred the way `kubectl` does: from
    /// `KUBECONFIG`, then `~/.kube/config`, then the in-cluster service account.
    pub async fn from_kubeconfig(
        kubeconfig: Option<&Utf8Path>,
        namespace: impl Into<String>,
    ) -> Result<Self, KubeClientError> {
        let config = match kubeconfig {
            Some(path) => {
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|err| KubeClientError::ReadKubeconfig {
                        path: path.to_owned(),
                        err,
                    })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|err| KubeClientError::Config(err.into()))?
            }
            None => Config::infer()
                .await
                .map_err(|err| KubeClientError::Config(err.into()))?,
        };
        let client = Client::try_from(config).map_err(KubeClientError::Client)?;
        Ok(Self::new(client, namespace))
    }

    /// Returns the namespace this store operates in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn test_runs(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &self.test_run_resource)
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn pod_names(&self, label_selector: &str) -> Result<Vec<String>, StoreError> {
        let pods = self
            .pods()
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|err| StoreError::request(format!("list pods matching `{label_selector}`"), err))?;
        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect())
    }

    async fn job_pod_names(&self, job_name: &str) -> Result<Vec<String>, StoreError> {
        let names = self.pod_names(&job_selector(job_name)).await?;
        if names.is_empty() {
            return Err(StoreError::NoPods {
                job_name: job_name.to_owned(),
            });
        }
        Ok(names)
    }

    async fn read_logs(&self, pod_name: &str, params: &LogParams) -> Result<String, StoreError> {
        self.pods()
            .logs(pod_name, params)
            .await
            .map_err(|err| StoreError::request(format!("read logs of pod `{pod_name}`"), err))
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn create_object(&self, payload: &ObjectPayload) -> Result<(), StoreError> {
        let params = PostParams::default();
        let kind = payload.kind();
        let name = payload.name();
        let res = match payload {
            ObjectPayload::ConfigMap(config_map) => self
                .config_maps()
                .create(&params, &to_config_map(config_map))
                .await
                .map(|_| ()),
            ObjectPayload::TestRun(manifest) => {
                let object = to_dynamic_object(manifest)?;
                self.test_runs().create(&params, &object).await.map(|_| ())
            }
        };
        res.map_err(|err| map_kube_error(err, kind, name, "create"))
    }

    async fn get_object(&self, kind: ObjectKind, name: &str) -> Result<(), StoreError> {
        let res = match kind {
            ObjectKind::ConfigMap => self.config_maps().get(name).await.map(|_| ()),
            ObjectKind::TestRun => self.test_runs().get(name).await.map(|_| ()),
            ObjectKind::Job => self.jobs().get(name).await.map(|_| ()),
        };
        res.map_err(|err| map_kube_error(err, kind, name, "get"))
    }

    async fn delete_object(&self, kind: ObjectKind, name: &str) -> Result<(), StoreError> {
        let params = DeleteParams::foreground();
        let res = match kind {
            ObjectKind::ConfigMap => self.config_maps().delete(name, &params).await.map(|_| ()),
            ObjectKind::TestRun => self.test_runs().delete(name, &params).await.map(|_| ()),
            ObjectKind::Job => self.jobs().delete(name, &params).await.map(|_| ()),
        };
        res.map_err(|err| map_kube_error(err, kind, name, "delete"))
    }

    async fn get_stage(&self, resource_name: &str) -> Result<Stage, StoreError> {
        let object = self
            .test_runs()
            .get(resource_name)
            .await
            .map_err(|err| map_kube_error(err, ObjectKind::TestRun, resource_name, "get"))?;
        stage_from_object(resource_name, &object)
    }

    async fn get_job_counters(&self, job_name: &str) -> Result<JobCounters, StoreError> {
        let job = self
            .jobs()
            .get(job_name)
            .await
            .map_err(|err| map_kube_error(err, ObjectKind::Job, job_name, "get"))?;
        Ok(counters_from_job(&job))
    }

    async fn pod_logs_since(
        &self,
        job_name: &str,
        since: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let params = LogParams {
            since_time: Some(since),
            ..Default::default()
        };
        let mut logs = String::new();
        for pod_name in self.job_pod_names(job_name).await? {
            logs.push_str(&self.read_logs(&pod_name, &params).await?);
        }
        Ok(logs)
    }

    async fn job_pod_logs(&self, job_name: &str) -> Result<Vec<PodLogs>, StoreError> {
        let params = LogParams::default();
        let mut all = Vec::new();
        for pod_name in self.job_pod_names(job_name).await? {
            let logs = self.read_logs(&pod_name, &params).await?;
            all.push(PodLogs { pod_name, logs });
        }
        Ok(all)
    }

    async fn stream_pod_logs(
        &self,
        job_name: &str,
        since: DateTime<Utc>,
    ) -> Result<LogStream, StoreError> {
        // A job has exactly one pod per attempt, so following the first one is enough.
        let pod_name = self
            .job_pod_names(job_name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NoPods {
                job_name: job_name.to_owned(),
            })?;
        debug!("following logs of pod `{pod_name}`");

        let params = LogParams {
            follow: true,
            since_time: Some(since),
            tail_lines: Some(STREAM_TAIL_LINES),
            ..Default::default()
        };
        Ok(FollowedLogs::spawn(self.pods(), pod_name, params).boxed())
    }

    async fn controller_logs(
        &self,
        since: DateTime<Utc>,
        label_selector: &str,
        container: &str,
    ) -> Result<String, StoreError> {
        let pod_names = self.pod_names(label_selector).await?;
        if pod_names.is_empty() {
            return Err(StoreError::NoMatchingPods {
                label_selector: label_selector.to_owned(),
            });
        }

        let params = LogParams {
            container: Some(container.to_owned()),
            since_time: Some(since),
            ..Default::default()
        };
        let mut logs = String::new();
        for pod_name in pod_names {
            logs.push_str(&self.read_logs(&pod_name, &params).await?);
        }
        Ok(logs)
    }
}

/// A followed pod log, read on a background task.
///
/// The reader returned by kube borrows the API handle, so it is driven on its own task and lines
/// are forwarded over a channel. Dropping the stream aborts the task.
struct FollowedLogs {
    receiver: mpsc::Receiver<Result<Bytes, StoreError>>,
    task: AbortHandle,
}

impl FollowedLogs {
    fn spawn(pods: Api<Pod>, pod_name: String, params: LogParams) -> Self {
        let (mut sender, receiver) = mpsc::channel(16);
        let task = tokio::spawn(async move {
            let reader = match pods.log_stream(&pod_name, &params).await {
                Ok(reader) => reader,
                Err(err) => {
                    let err = StoreError::request(format!("follow logs of pod `{pod_name}`"), err);
                    _ = sender.send(Err(err)).await;
                    return;
                }
            };

            let mut lines = std::pin::pin!(reader.lines());
            while let Some(line) = lines.next().await {
                let item = match line {
                    Ok(mut line) => {
                        line.push('\n');
                        Ok(Bytes::from(line))
                    }
                    Err(err) => Err(StoreError::request(
                        format!("read log stream of pod `{pod_name}`"),
                        err,
                    )),
                };
                let is_err = item.is_err();
                if sender.send(item).await.is_err() || is_err {
                    return;
                }
            }
        });

        Self {
            receiver,
            task: task.abort_handle(),
        }
    }
}

impl Stream for FollowedLogs {
    type Item = Result<Bytes, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl Drop for FollowedLogs {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn job_selector(job_name: &str) -> String {
    format!("job-name={job_name}")
}

fn map_kube_error(err: kube::Error, kind: ObjectKind, name: &str, verb: &str) -> StoreError {
    match err {
        kube::Error::Api(response) if response.code == 404 => StoreError::not_found(kind, name),
        err => StoreError::request(format!("{verb} {kind} `{name}`"), err),
    }
}

fn to_config_map(config_map: &ScriptConfigMap) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map.name.clone()),
            ..Default::default()
        },
        data: Some(config_map.data.clone()),
        ..Default::default()
    }
}

fn to_dynamic_object(manifest: &TestRunManifest) -> Result<DynamicObject, StoreError> {
    serde_json::to_value(manifest)
        .and_then(serde_json::from_value)
        .map_err(|err| StoreError::decode(format!("manifest of test run `{}`", manifest.name()), err))
}

fn stage_from_object(resource_name: &str, object: &DynamicObject) -> Result<Stage, StoreError> {
    let not_reported = || StoreError::StatusNotReported {
        kind: ObjectKind::TestRun,
        name: resource_name.to_owned(),
    };

    let status = object.data.get("status").ok_or_else(not_reported)?;
    let status: TestRunStatus = serde_json::from_value(status.clone()).map_err(|err| {
        StoreError::decode(format!("status of test run `{resource_name}`"), err)
    })?;
    let stage = status.stage.ok_or_else(not_reported)?;
    stage
        .parse()
        .map_err(|err| StoreError::decode(format!("stage of test run `{resource_name}`"), err))
}

fn counters_from_job(job: &Job) -> JobCounters {
    let status = job.status.as_ref();
    let count = |value: Option<i32>| value.and_then(|v| u32::try_from(v).ok()).unwrap_or(0);
    JobCounters::new(
        count(status.and_then(|s| s.succeeded)),
        count(status.and_then(|s| s.failed)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::JobStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn test_run(data: serde_json::Value) -> DynamicObject {
        let mut object = json!({
            "apiVersion": "k6.io/v1alpha1",
            "kind": "TestRun",
            "metadata": { "name": "run-abc" },
        });
        object
            .as_object_mut()
            .unwrap()
            .extend(data.as_object().unwrap().clone());
        serde_json::from_value(object).unwrap()
    }

    #[test]
    fn stage_is_read_from_status() {
        let object = test_run(json!({ "status": { "stage": "created", "testRunId": "" } }));
        assert_eq!(stage_from_object("run-abc", &object).unwrap(), Stage::Created);
    }

    #[test]
    fn missing_status_is_not_reported() {
        for object in [test_run(json!({})), test_run(json!({ "status": {} }))] {
            let err = stage_from_object("run-abc", &object).unwrap_err();
            assert!(
                matches!(err, StoreError::StatusNotReported { .. }),
                "unexpected error: {err:?}"
            );
        }
    }

    #[test]
    fn unknown_stage_is_a_decode_error() {
        let object = test_run(json!({ "status": { "stage": "Created" } }));
        let err = stage_from_object("run-abc", &object).unwrap_err();
        assert_eq!(err.to_string(), "failed to decode stage of test run `run-abc`");
    }

    #[test_case(None, JobCounters::new(0, 0); "no status")]
    #[test_case(Some((None, None)), JobCounters::new(0, 0); "no counters")]
    #[test_case(Some((Some(1), None)), JobCounters::new(1, 0); "succeeded")]
    #[test_case(Some((None, Some(1))), JobCounters::new(0, 1); "failed")]
    #[test_case(Some((Some(-1), Some(2))), JobCounters::new(0, 2); "negative is zero")]
    fn job_counters(status: Option<(Option<i32>, Option<i32>)>, expected: JobCounters) {
        let job = Job {
            status: status.map(|(succeeded, failed)| JobStatus {
                succeeded,
                failed,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(counters_from_job(&job), expected);
    }

    #[test]
    fn manifests_convert_to_dynamic_objects() {
        use crate::{
            manifest::{RunnerSettings, ScriptSource},
            naming::{RunId, RunNames},
        };

        let names = RunNames::new(RunId::from_string("abc"));
        let manifest = TestRunManifest::new(
            &names,
            2,
            &ScriptSource::volume_claim("main.js"),
            &RunnerSettings::default(),
        );
        let object = to_dynamic_object(&manifest).unwrap();
        assert_eq!(object.metadata.name.as_deref(), Some("run-abc"));
        assert_eq!(object.data["spec"]["parallelism"], json!(2));
    }
}
