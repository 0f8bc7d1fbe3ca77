use serde::{Deserialize, Serialize};

/// A salesperson and the targets assigned to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Assigned target pool.
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Free-form sales figures (monthly sales, goal, progress) passed to the generator.
    #[serde(default)]
    pub sales_context: serde_json::Value,
}

/// A client account a recommendation can be about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub target_id: String,
    pub name: String,
    #[serde(default)]
    pub monthly_sales: f64,
    #[serde(default)]
    pub metrics: Option<TargetMetrics>,
    #[serde(default)]
    pub open_claims: u32,
    #[serde(default)]
    pub pickups: Option<PickupStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[serde(alias = "rojo")]
    Red,
    #[serde(alias = "amarillo")]
    Yellow,
    #[serde(alias = "verde")]
    Green,
}

/// Business signals used to rank targets before generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetMetrics {
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub drop_flag: bool,
    #[serde(default)]
    pub needs_attention: bool,
    #[serde(default)]
    pub high_value: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Average units over the last three months.
    #[serde(default)]
    pub avg_last3: Option<f64>,
    /// Average units over the three months before that.
    #[serde(default)]
    pub avg_prev3: Option<f64>,
    /// Consecutive months below the 25th percentile.
    #[serde(default)]
    pub consec_below_p25: u32,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PickupStats {
    pub scheduled: u32,
    pub completed: u32,
}

impl PickupStats {
    pub fn completion_ratio(&self) -> Option<f64> {
        (self.scheduled > 0).then(|| f64::from(self.completed) / f64::from(self.scheduled))
    }
}

impl Target {
    /// Urgency score used to order targets in the generator prompt.
    pub fn priority_score(&self) -> u32 {
        let mut score = 0;

        if let Some(metrics) = &self.metrics {
            score += match metrics.risk_level {
                Some(RiskLevel::Red) => 100,
                Some(RiskLevel::Yellow) => 50,
                _ => 0,
            };
            if metrics.drop_flag {
                score += 80;
            }
            if metrics.needs_attention {
                score += 40;
            }
            if metrics.high_value {
                score += 30;
            }
            if !metrics.active {
                score += 20;
            }
        }

        if self.open_claims > 0 {
            score += 60;
        }
        if self
            .pickups
            .and_then(|p| p.completion_ratio())
            .is_some_and(|ratio| ratio < 0.8)
        {
            score += 30;
        }
        if self.monthly_sales > 0.0 {
            score += 10;
        }

        score
    }
}
