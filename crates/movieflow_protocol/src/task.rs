use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one unit of work in the pipeline graph.
/// This is the CANONICAL list - the runner, the report and the CLI all use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    GetInputs,
    GetFiles,
    PartitionFiles,
    RawDataToS3,
    CreateTablePostgres,
    PushToDatabase,
    CreateTableRds,
    PushToRds,
    ProcessData,
    ProcessedDataToS3,
    RemoveCsvFiles,
    RemoveParquetFiles,
}

impl TaskId {
    pub const ALL: [TaskId; 12] = [
        TaskId::GetInputs,
        TaskId::GetFiles,
        TaskId::PartitionFiles,
        TaskId::RawDataToS3,
        TaskId::CreateTablePostgres,
        TaskId::PushToDatabase,
        TaskId::CreateTableRds,
        TaskId::PushToRds,
        TaskId::ProcessData,
        TaskId::ProcessedDataToS3,
        TaskId::RemoveCsvFiles,
        TaskId::RemoveParquetFiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskId::GetInputs => "get_inputs",
            TaskId::GetFiles => "get_files",
            TaskId::PartitionFiles => "partition_files",
            TaskId::RawDataToS3 => "raw_data_to_s3",
            TaskId::CreateTablePostgres => "create_table_postgres",
            TaskId::PushToDatabase => "push_to_database",
            TaskId::CreateTableRds => "create_table_rds",
            TaskId::PushToRds => "push_to_rds",
            TaskId::ProcessData => "process_data",
            TaskId::ProcessedDataToS3 => "processed_data_to_s3",
            TaskId::RemoveCsvFiles => "remove_csv_files",
            TaskId::RemoveParquetFiles => "remove_parquet_files",
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskId::ALL
            .iter()
            .copied()
            .find(|task| task.as_str() == s)
            .ok_or_else(|| format!("Unknown task: '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_names_parse_back() {
        for task in TaskId::ALL {
            assert_eq!(task.as_str().parse::<TaskId>().unwrap(), task);
        }
        assert!("push_to_lake".parse::<TaskId>().is_err());
    }
}
