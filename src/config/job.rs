use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Scheduler resources and the training command a batch job runs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct JobConfig {
    #[serde(default = "default_job_name")]
    pub name: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default = "default_one")]
    pub nodes: usize,
    #[serde(default = "default_one")]
    pub gpus_per_node: usize,
    #[serde(default)]
    pub gpu_type: Option<String>,
    /// Defaults to one task per GPU.
    #[serde(default)]
    pub tasks_per_node: Option<usize>,
    #[serde(default = "default_cpus_per_task")]
    pub cpus_per_task: usize,
    #[serde(default)]
    pub mem: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    /// Raw shell lines run before dependencies are installed.
    #[serde(default)]
    pub setup: Vec<String>,
    #[serde(default)]
    pub requirements: Option<PathBuf>,
    #[serde(default = "default_launcher")]
    pub launcher: String,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    #[serde(default = "default_data_flag")]
    pub data_flag: String,
    #[serde(default)]
    pub hyperparameters: IndexMap<String, toml::Value>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: default_job_name(),
            account: None,
            partition: None,
            time: default_time(),
            nodes: 1,
            gpus_per_node: 1,
            gpu_type: None,
            tasks_per_node: None,
            cpus_per_task: default_cpus_per_task(),
            mem: None,
            output: None,
            modules: Vec::new(),
            setup: Vec::new(),
            requirements: None,
            launcher: default_launcher(),
            entry_point: default_entry_point(),
            data_flag: default_data_flag(),
            hyperparameters: IndexMap::new(),
        }
    }
}

impl JobConfig {
    pub fn tasks_per_node(&self) -> usize {
        self.tasks_per_node.unwrap_or(self.gpus_per_node)
    }
}

fn default_job_name() -> String {
    "plasmid-lm".to_string()
}

fn default_time() -> String {
    "24:00:00".to_string()
}

fn default_one() -> usize {
    1
}

fn default_cpus_per_task() -> usize {
    8
}

fn default_launcher() -> String {
    "python".to_string()
}

fn default_entry_point() -> String {
    "train.py".to_string()
}

fn default_data_flag() -> String {
    "data_dir".to_string()
}
