use crate::engine::RawEvent;
use serde::Deserialize;

/// What an event asks the agent to do. Unknown shapes never fail to classify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
  FullScan,
  Scheduled,
  SpotInterruption {
    instance_id: Option<String>,
  },
  RebalanceRecommendation {
    instance_id: Option<String>,
  },
  InstanceStateChange {
    instance_id: Option<String>,
    state: Option<String>,
  },
  AutoScalingApiCall {
    event_name: Option<String>,
  },
  Unknown {
    detail_type: Option<String>,
  },
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
  #[serde(default)]
  source: Option<String>,

  #[serde(default, rename = "detail-type")]
  detail_type: Option<String>,

  #[serde(default)]
  detail: Detail,
}

#[derive(Debug, Default, Deserialize)]
struct Detail {
  #[serde(default, rename = "instance-id")]
  instance_id: Option<String>,

  #[serde(default)]
  state: Option<String>,

  #[serde(default, rename = "eventName")]
  event_name: Option<String>,
}

impl EventKind {
  pub fn classify(event: Option<&RawEvent>) -> Self {
    let Some(event) = event else {
      return Self::FullScan;
    };

    let envelope = match serde_json::from_slice::<Envelope>(event.as_bytes()) {
      Ok(e) => e,
      Err(e) => {
        tracing::debug!(error = %e, bytes = event.len(), "event is not a JSON envelope");
        return Self::Unknown { detail_type: None };
      }
    };

    let Envelope {
      source,
      detail_type,
      detail,
    } = envelope;

    match (source.as_deref(), detail_type.as_deref()) {
      (Some("aws.events"), Some("Scheduled Event")) => Self::Scheduled,
      (_, Some("EC2 Spot Instance Interruption Warning")) => Self::SpotInterruption {
        instance_id: detail.instance_id,
      },
      (_, Some("EC2 Instance Rebalance Recommendation")) => Self::RebalanceRecommendation {
        instance_id: detail.instance_id,
      },
      (_, Some("EC2 Instance State-change Notification")) => Self::InstanceStateChange {
        instance_id: detail.instance_id,
        state: detail.state,
      },
      (Some("aws.autoscaling"), Some("AWS API Call via CloudTrail")) => Self::AutoScalingApiCall {
        event_name: detail.event_name,
      },
      _ => Self::Unknown { detail_type },
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::FullScan => "full_scan",
      Self::Scheduled => "scheduled",
      Self::SpotInterruption { .. } => "spot_interruption",
      Self::RebalanceRecommendation { .. } => "rebalance_recommendation",
      Self::InstanceStateChange { .. } => "instance_state_change",
      Self::AutoScalingApiCall { .. } => "autoscaling_api_call",
      Self::Unknown { .. } => "unknown",
    }
  }
}
