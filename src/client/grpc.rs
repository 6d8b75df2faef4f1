//! tonic-backed [`SuggestionClient`]

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use prost::Message;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tonic::transport::Endpoint;
use tonic::{Code, Status};
use tracing::{debug, warn};

use super::proto;
use super::{ClientError, SuggestionClient, SyncReply};
use crate::composer::{resource_name, EARLY_STOPPING_PORT, SUGGESTION_PORT};
use crate::crd::{
    AlgorithmSetting, AlgorithmSpec, ComparisonType, EarlyStoppingRule, Experiment,
    ObjectiveSpec, ObjectiveType, ParameterAssignment, ParameterType, Suggestion, Trial,
    TrialAssignment,
};

/// Address of the metrics database the early-stopping service reads from
pub const DEFAULT_DB_MANAGER_ADDRESS: &str = "katib-db-manager.kubeflow:6789";

const TRIAL_SUFFIX_LEN: usize = 8;

/// Calls the algorithm service of a Suggestion over its in-cluster Service
#[derive(Clone, Debug)]
pub struct GrpcSuggestionClient {
    connect_timeout: Duration,
    db_manager_address: String,
}

impl GrpcSuggestionClient {
    /// Create a client; `db_manager_address` is forwarded to the early-stopping service
    pub fn new(connect_timeout: Duration, db_manager_address: impl Into<String>) -> Self {
        Self {
            connect_timeout,
            db_manager_address: db_manager_address.into(),
        }
    }

    async fn unary<Req, Reply>(
        &self,
        suggestion: &Suggestion,
        port: i32,
        path: &'static str,
        request: Req,
    ) -> Result<Reply, ClientError>
    where
        Req: Message + Send + Sync + 'static,
        Reply: Message + Default + Send + Sync + 'static,
    {
        let uri = endpoint_uri(suggestion, port);
        let channel = Endpoint::from_shared(uri.clone())
            .map_err(|e| ClientError::Unavailable(format!("invalid endpoint {uri}: {e}")))?
            .connect_timeout(self.connect_timeout)
            .connect()
            .await
            .map_err(|e| ClientError::Unavailable(format!("connect {uri}: {e}")))?;

        let mut grpc = tonic::client::Grpc::new(channel);
        grpc.ready()
            .await
            .map_err(|e| ClientError::Unavailable(format!("service not ready: {e}")))?;

        debug!(endpoint = %uri, path, "calling algorithm service");
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(path);
        let response = grpc
            .unary(tonic::Request::new(request), path, codec)
            .await
            .map_err(map_status)?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl SuggestionClient for GrpcSuggestionClient {
    async fn validate_algorithm_settings(
        &self,
        suggestion: &Suggestion,
        experiment: &Experiment,
    ) -> Result<(), ClientError> {
        let request = proto::ValidateAlgorithmSettingsRequest {
            experiment: Some(experiment_to_proto(experiment, suggestion)),
        };
        let _: proto::ValidateAlgorithmSettingsReply = self
            .unary(
                suggestion,
                SUGGESTION_PORT,
                proto::VALIDATE_ALGORITHM_SETTINGS,
                request,
            )
            .await?;

        if let Some(es) = &suggestion.spec.early_stopping {
            let request = proto::ValidateEarlyStoppingSettingsRequest {
                early_stopping: Some(early_stopping_to_proto(es)),
            };
            let _: proto::ValidateEarlyStoppingSettingsReply = self
                .unary(
                    suggestion,
                    EARLY_STOPPING_PORT,
                    proto::VALIDATE_EARLY_STOPPING_SETTINGS,
                    request,
                )
                .await
                .map_err(ClientError::attributed_to_early_stopping)?;
        }
        Ok(())
    }

    async fn sync_assignments(
        &self,
        suggestion: &Suggestion,
        experiment: &Experiment,
        trials: &[Trial],
    ) -> Result<SyncReply, ClientError> {
        let experiment_pb = experiment_to_proto(experiment, suggestion);
        let trials_pb: Vec<proto::Trial> = trials.iter().map(trial_to_proto).collect();
        let request = suggestions_request(suggestion, experiment_pb.clone(), trials_pb.clone());

        let reply: proto::GetSuggestionsReply = self
            .unary(suggestion, SUGGESTION_PORT, proto::GET_SUGGESTIONS, request)
            .await?;

        let mut rules = rules_from_proto(&reply.early_stopping_rules);
        if suggestion.spec.early_stopping.is_some() {
            let request = proto::GetEarlyStoppingRulesRequest {
                experiment: Some(experiment_pb),
                trials: trials_pb,
                db_manager_address: self.db_manager_address.clone(),
            };
            let es_reply: proto::GetEarlyStoppingRulesReply = self
                .unary(
                    suggestion,
                    EARLY_STOPPING_PORT,
                    proto::GET_EARLY_STOPPING_RULES,
                    request,
                )
                .await?;
            rules.extend(rules_from_proto(&es_reply.early_stopping_rules));
        }

        Ok(sync_reply_from_proto(&experiment.name_any(), reply, rules))
    }
}

fn endpoint_uri(suggestion: &Suggestion, port: i32) -> String {
    format!(
        "http://{}.{}:{}",
        resource_name(suggestion),
        suggestion.namespace().unwrap_or_default(),
        port
    )
}

fn map_status(status: Status) -> ClientError {
    match status.code() {
        Code::InvalidArgument => ClientError::Rejected {
            reason: "InvalidArgument".to_string(),
            message: status.message().to_string(),
        },
        code => ClientError::Unavailable(format!("{code:?}: {}", status.message())),
    }
}

fn suggestions_request(
    suggestion: &Suggestion,
    experiment: proto::Experiment,
    trials: Vec<proto::Trial>,
) -> proto::GetSuggestionsRequest {
    let requests = suggestion.spec.requests;
    let assigned = suggestion
        .status
        .as_ref()
        .map(|s| s.suggestion_count)
        .unwrap_or(0);
    proto::GetSuggestionsRequest {
        experiment: Some(experiment),
        trials,
        current_request_number: (requests - assigned).max(0),
        total_request_number: requests,
    }
}

/// Settings reported back by the service override the spec's, by name.
fn effective_algorithm(suggestion: &Suggestion) -> AlgorithmSpec {
    let mut algorithm = suggestion.spec.algorithm.clone();
    let reported = suggestion
        .status
        .as_ref()
        .map(|s| s.algorithm_settings.as_slice())
        .unwrap_or_default();
    for setting in reported {
        match algorithm
            .algorithm_settings
            .iter_mut()
            .find(|s| s.name == setting.name)
        {
            Some(existing) => existing.value = setting.value.clone(),
            None => algorithm.algorithm_settings.push(setting.clone()),
        }
    }
    algorithm
}

fn experiment_to_proto(experiment: &Experiment, suggestion: &Suggestion) -> proto::Experiment {
    let spec = &experiment.spec;
    let algorithm = effective_algorithm(suggestion);
    proto::Experiment {
        name: experiment.name_any(),
        spec: Some(proto::ExperimentSpec {
            parameter_specs: Some(proto::ParameterSpecs {
                parameters: spec
                    .parameters
                    .iter()
                    .map(|p| proto::ParameterSpec {
                        name: p.name.clone(),
                        parameter_type: parameter_type_to_proto(p.parameter_type) as i32,
                        feasible_space: Some(proto::FeasibleSpace {
                            max: p.feasible_space.max.clone().unwrap_or_default(),
                            min: p.feasible_space.min.clone().unwrap_or_default(),
                            list: p.feasible_space.list.clone(),
                            step: p.feasible_space.step.clone().unwrap_or_default(),
                            distribution: p
                                .feasible_space
                                .distribution
                                .as_deref()
                                .map(proto::Distribution::from_crd_name)
                                .unwrap_or(proto::Distribution::Unknown)
                                as i32,
                        }),
                    })
                    .collect(),
            }),
            objective: spec.objective.as_ref().map(objective_to_proto),
            algorithm: Some(proto::AlgorithmSpec {
                algorithm_name: algorithm.algorithm_name,
                algorithm_settings: algorithm
                    .algorithm_settings
                    .into_iter()
                    .map(|s| proto::AlgorithmSetting {
                        name: s.name,
                        value: s.value,
                    })
                    .collect(),
            }),
            early_stopping: suggestion
                .spec
                .early_stopping
                .as_ref()
                .map(early_stopping_to_proto),
            parallel_trial_count: spec.parallel_trial_count.unwrap_or_default(),
            max_trial_count: spec.max_trial_count.unwrap_or_default(),
        }),
    }
}

fn parameter_type_to_proto(t: ParameterType) -> proto::ParameterType {
    match t {
        ParameterType::Double => proto::ParameterType::Double,
        ParameterType::Int => proto::ParameterType::Int,
        ParameterType::Discrete => proto::ParameterType::Discrete,
        ParameterType::Categorical => proto::ParameterType::Categorical,
    }
}

fn objective_to_proto(objective: &ObjectiveSpec) -> proto::ObjectiveSpec {
    let type_ = match objective.type_ {
        ObjectiveType::Minimize => proto::ObjectiveType::Minimize,
        ObjectiveType::Maximize => proto::ObjectiveType::Maximize,
    };
    proto::ObjectiveSpec {
        r#type: type_ as i32,
        goal: objective.goal.unwrap_or_default(),
        objective_metric_name: objective.objective_metric_name.clone(),
        additional_metric_names: objective.additional_metric_names.clone(),
    }
}

fn early_stopping_to_proto(es: &AlgorithmSpec) -> proto::EarlyStoppingSpec {
    proto::EarlyStoppingSpec {
        algorithm_name: es.algorithm_name.clone(),
        algorithm_settings: es
            .algorithm_settings
            .iter()
            .map(|s| proto::EarlyStoppingSetting {
                name: s.name.clone(),
                value: s.value.clone(),
            })
            .collect(),
    }
}

fn trial_to_proto(trial: &Trial) -> proto::Trial {
    let status = trial.status.as_ref();
    proto::Trial {
        name: trial.name_any(),
        spec: Some(proto::TrialSpec {
            experiment_name: trial
                .labels()
                .get(crate::crd::EXPERIMENT_LABEL)
                .cloned()
                .unwrap_or_default(),
            parameter_assignments: Some(proto::ParameterAssignments {
                assignments: trial
                    .spec
                    .parameter_assignments
                    .iter()
                    .map(|a| proto::ParameterAssignment {
                        name: a.name.clone(),
                        value: a.value.clone(),
                    })
                    .collect(),
            }),
            objective: trial.spec.objective.as_ref().map(objective_to_proto),
            labels: trial
                .labels()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }),
        status: Some(proto::TrialStatus {
            start_time: String::new(),
            completion_time: String::new(),
            condition: proto::TrialCondition::from_condition_type(
                status.and_then(|s| s.current_condition()),
            ) as i32,
            observation: status.and_then(|s| s.observation.as_ref()).map(|o| {
                proto::Observation {
                    metrics: o
                        .metrics
                        .iter()
                        .map(|m| proto::Metric {
                            name: m.name.clone(),
                            value: m.latest.clone(),
                        })
                        .collect(),
                }
            }),
        }),
    }
}

fn rules_from_proto(rules: &[proto::EarlyStoppingRule]) -> Vec<EarlyStoppingRule> {
    rules
        .iter()
        .filter_map(|r| {
            let comparison = match r.comparison {
                c if c == proto::ComparisonType::Equal as i32 => ComparisonType::Equal,
                c if c == proto::ComparisonType::Less as i32 => ComparisonType::Less,
                c if c == proto::ComparisonType::Greater as i32 => ComparisonType::Greater,
                other => {
                    warn!(rule = %r.name, comparison = other, "dropping early-stopping rule with unknown comparison");
                    return None;
                }
            };
            Some(EarlyStoppingRule {
                name: r.name.clone(),
                value: r.value.clone(),
                comparison,
                start_step: r.start_step,
            })
        })
        .collect()
}

fn sync_reply_from_proto(
    experiment: &str,
    reply: proto::GetSuggestionsReply,
    rules: Vec<EarlyStoppingRule>,
) -> SyncReply {
    let assignments = reply
        .parameter_assignments
        .into_iter()
        .map(|pa| TrialAssignment {
            name: if pa.trial_name.is_empty() {
                generate_trial_name(experiment)
            } else {
                pa.trial_name
            },
            parameter_assignments: pa
                .assignments
                .into_iter()
                .map(|a| ParameterAssignment {
                    name: a.name,
                    value: a.value,
                })
                .collect(),
            early_stopping_rules: rules.clone(),
            labels: pa.labels.into_iter().collect::<BTreeMap<_, _>>(),
        })
        .collect();

    let algorithm_settings = reply
        .algorithm
        .map(|a| {
            a.algorithm_settings
                .into_iter()
                .map(|s| AlgorithmSetting::new(s.name, s.value))
                .collect()
        })
        .unwrap_or_default();

    SyncReply {
        assignments,
        algorithm_settings,
    }
}

/// `<experiment>-<8 random lowercase alphanumerics>`
fn generate_trial_name(experiment: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TRIAL_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{experiment}-{suffix}")
}
