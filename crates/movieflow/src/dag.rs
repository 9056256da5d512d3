//! Dependency graph of the daily run.
//!
//! ```text
//! get_inputs -> get_files -> partition_files
//! partition_files -> raw_data_to_s3 -> process_data -> processed_data_to_s3
//! partition_files -> create_table_postgres -> push_to_database
//! partition_files -> create_table_rds -> push_to_rds
//! {processed_data_to_s3, push_to_database, push_to_rds} -> remove_csv_files
//! remove_csv_files -> remove_parquet_files
//! ```

use movieflow_protocol::TaskId;

/// Direct upstream tasks of `task`.
pub fn upstream(task: TaskId) -> &'static [TaskId] {
    use TaskId::*;
    match task {
        GetInputs => &[],
        GetFiles => &[GetInputs],
        PartitionFiles => &[GetFiles],
        RawDataToS3 => &[PartitionFiles],
        CreateTablePostgres => &[PartitionFiles],
        CreateTableRds => &[PartitionFiles],
        PushToDatabase => &[CreateTablePostgres],
        PushToRds => &[CreateTableRds],
        ProcessData => &[RawDataToS3],
        ProcessedDataToS3 => &[ProcessData],
        RemoveCsvFiles => &[ProcessedDataToS3, PushToDatabase, PushToRds],
        RemoveParquetFiles => &[RemoveCsvFiles],
    }
}

/// Direct downstream tasks of `task`.
pub fn downstream(task: TaskId) -> Vec<TaskId> {
    TaskId::ALL
        .iter()
        .copied()
        .filter(|t| upstream(*t).contains(&task))
        .collect()
}

/// Tasks in an order where every task follows its upstream tasks.
pub fn topological_order() -> Vec<TaskId> {
    let mut ordered: Vec<TaskId> = Vec::with_capacity(TaskId::ALL.len());
    while ordered.len() < TaskId::ALL.len() {
        let before = ordered.len();
        for task in TaskId::ALL {
            if !ordered.contains(&task) && upstream(task).iter().all(|u| ordered.contains(u)) {
                ordered.push(task);
            }
        }
        if ordered.len() == before {
            // Unreachable with the static graph above; guards against a cycle.
            break;
        }
    }
    ordered
}
