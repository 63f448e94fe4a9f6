pub mod config;
pub mod report;

pub use config::{load_config, parse_config, RunConfig, CONFIG_SCHEMA_VERSION};
pub use report::{
    render_summary, render_trial_line, write_report, Report, TrialOutcome, TrialRecord,
};

use race_core::{
    classify, AdapterFactory, FieldNames, HarnessError, MutationGenerator, OpKind, Record,
    StorageAdapter, StoreError, TrialInput,
};
use rand::Rng;
use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

async fn with_timeout<T>(
    op: OpKind,
    key: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            op,
            key: key.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

pub async fn run_trial<A, B>(
    a: &A,
    b: &B,
    input: &TrialInput,
    fields: &FieldNames,
    op_timeout: Duration,
) -> Result<Option<Record>, StoreError>
where
    A: StorageAdapter,
    B: StorageAdapter,
{
    let key = input.key.as_str();
    with_timeout(OpKind::Delete, key, op_timeout, a.delete(key)).await?;

    let flag = input.flag_mutation(fields);
    let member = input.set_mutation(fields);
    let (flag_result, member_result) = tokio::join!(
        with_timeout(OpKind::Upsert, key, op_timeout, a.upsert(key, &flag)),
        with_timeout(OpKind::Upsert, key, op_timeout, b.upsert(key, &member)),
    );
    match (flag_result, member_result) {
        (Ok(()), Ok(())) => {}
        (Err(err), Ok(())) | (Ok(()), Err(err)) => return Err(err),
        (Err(err), Err(other)) => {
            tracing::debug!(key, error = %other, "second racing write also failed");
            return Err(err);
        }
    }

    with_timeout(OpKind::Fetch, key, op_timeout, a.fetch(key)).await
}

#[derive(Debug, Clone)]
pub struct Harness {
    config: RunConfig,
}

impl Harness {
    pub fn new(config: RunConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn generator(&self) -> MutationGenerator {
        let generator = match self.config.seed {
            Some(seed) => MutationGenerator::seeded(seed),
            None => MutationGenerator::from_entropy(),
        };
        generator.with_flag(self.config.flag)
    }

    pub async fn run<F: AdapterFactory>(
        &self,
        factory: &F,
        backend: &str,
    ) -> Result<Report, HarnessError> {
        self.run_with(factory, backend, |_| {}).await
    }

    pub async fn run_with<F, O>(
        &self,
        factory: &F,
        backend: &str,
        observer: O,
    ) -> Result<Report, HarnessError>
    where
        F: AdapterFactory,
        O: FnMut(&TrialRecord),
    {
        let mut generator = self.generator();
        self.run_with_generator(factory, backend, &mut generator, observer)
            .await
    }

    pub async fn run_with_generator<F, R, O>(
        &self,
        factory: &F,
        backend: &str,
        generator: &mut MutationGenerator<R>,
        mut observer: O,
    ) -> Result<Report, HarnessError>
    where
        F: AdapterFactory,
        R: Rng,
        O: FnMut(&TrialRecord),
    {
        let [id_a, id_b] = &self.config.client_ids;
        let a = factory
            .connect(id_a)
            .await
            .map_err(|source| HarnessError::Connection {
                client_id: id_a.clone(),
                source,
            })?;
        let b = match factory.connect(id_b).await {
            Ok(b) => b,
            Err(source) => {
                if let Err(err) = a.close().await {
                    tracing::warn!(client_id = %id_a, error = %err, "close failed");
                }
                return Err(HarnessError::Connection {
                    client_id: id_b.clone(),
                    source,
                });
            }
        };
        tracing::info!(
            backend,
            trials = self.config.trials,
            client_a = a.client_id(),
            client_b = b.client_id(),
            "run started"
        );

        let fields = &self.config.fields;
        let mut report = Report::new(backend, fields.clone());
        let mut seen_keys = HashSet::with_capacity(self.config.trials);
        for index in 1..=self.config.trials {
            let input = generator.generate();
            if !seen_keys.insert(input.key.clone()) {
                report.key_collisions += 1;
                tracing::warn!(index, key = %input.key, "trial key repeated within run");
            }

            let started = Instant::now();
            let result = run_trial(&a, &b, &input, fields, self.config.op_timeout).await;
            let (outcome, document) = match result {
                Ok(record) => {
                    let outcome = classify(
                        record.as_ref(),
                        fields,
                        input.flag_value,
                        &input.set_member,
                    );
                    tracing::debug!(index, key = %input.key, %outcome, "trial classified");
                    (
                        TrialOutcome::Classified(outcome),
                        record.as_ref().map(Record::to_value),
                    )
                }
                Err(err) => {
                    tracing::warn!(index, key = %input.key, error = %err, "trial failed");
                    (TrialOutcome::Error(err.to_string()), None)
                }
            };
            let trial = TrialRecord {
                index,
                key: input.key,
                flag_value: input.flag_value,
                set_member: input.set_member,
                outcome,
                document,
                elapsed: started.elapsed(),
            };
            observer(&trial);
            report.push(trial);
        }
        report.finish();

        for (id, closed) in [(id_a, a.close().await), (id_b, b.close().await)] {
            if let Err(err) = closed {
                tracing::warn!(client_id = %id, error = %err, "close failed");
            }
        }
        tracing::info!(
            successes = report.successes(),
            losses = report.losses(),
            errors = report.errors,
            loss_rate = report.loss_rate(),
            "run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use race_core::{Mutation, Outcome};
    use race_store::{MemoryMode, MemoryStore};

    fn input(key: &str) -> TrialInput {
        TrialInput {
            key: key.to_string(),
            flag_value: false,
            set_member: "123456789".to_string(),
        }
    }

    #[tokio::test]
    async fn run_trial_clears_stale_state_first() {
        let fields = FieldNames::default();
        let store = MemoryStore::new(MemoryMode::Atomic);
        let a = store.adapter("Test1");
        let b = store.adapter("Test2");
        a.upsert(
            "100000001",
            &Mutation::new()
                .set("isProxy", serde_json::json!(true))
                .set("deleted", serde_json::json!(true)),
        )
        .await
        .expect("seed stale doc");

        let record = run_trial(&a, &b, &input("100000001"), &fields, Duration::from_secs(1))
            .await
            .expect("trial")
            .expect("document");
        assert_eq!(
            record.to_value(),
            serde_json::json!({"isProxy": false, "profileIds": ["123456789"]})
        );
        assert_eq!(
            classify(Some(&record), &fields, false, "123456789"),
            Outcome::FullSuccess
        );
    }

    #[test]
    fn harness_rejects_invalid_config() {
        let config = RunConfig {
            trials: 0,
            ..RunConfig::default()
        };
        assert!(matches!(
            Harness::new(config),
            Err(HarnessError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn observer_sees_every_trial_in_order() {
        let harness = Harness::new(RunConfig {
            trials: 5,
            seed: Some(3),
            ..RunConfig::default()
        })
        .expect("harness");
        let store = MemoryStore::new(MemoryMode::Atomic);
        let mut seen = Vec::new();
        let report = harness
            .run_with(&store, "memory://atomic", |t| seen.push(t.index))
            .await
            .expect("run");
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(report.trials.len(), 5);
        assert!(report.finished_at.is_some());
    }
}
