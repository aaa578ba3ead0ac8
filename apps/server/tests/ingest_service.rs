//! Ingest service behavior against a recording queue double.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{json, Value};
use silo::queue::{Job, JobPriority, JobQueue, RetryPolicy, STAGE_BATCH_JOB_TYPE};
use silo::services::IngestService;
use silo::Result;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct EnqueuedJob {
    job_type: String,
    parameters: Value,
    priority: i32,
}

/// Queue double that records enqueue calls and does nothing else.
#[derive(Default)]
struct RecordingQueue {
    enqueued: Mutex<Vec<EnqueuedJob>>,
}

impl RecordingQueue {
    fn jobs(&self) -> Vec<EnqueuedJob> {
        self.enqueued.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(
        &self,
        job_type: String,
        parameters: Value,
        priority: JobPriority,
        _retry_policy: Option<RetryPolicy>,
    ) -> Result<Uuid> {
        self.enqueued.lock().unwrap().push(EnqueuedJob {
            job_type,
            parameters,
            priority: priority as i32,
        });
        Ok(Uuid::new_v4())
    }

    async fn dequeue(&self, _job_types: &[String], _worker_id: &str) -> Result<Option<Job>> {
        Ok(None)
    }

    async fn listen<'a>(&'a self, _job_types: &'a [String]) -> Result<BoxStream<'a, Result<Job>>> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn get_job(&self, _job_id: Uuid) -> Result<Option<Job>> {
        Ok(None)
    }

    async fn update_progress(
        &self,
        _job_id: Uuid,
        _processed_items: i32,
        _total_items: Option<i32>,
        _progress_data: Option<Value>,
    ) -> Result<()> {
        Ok(())
    }

    async fn complete_job(&self, _job_id: Uuid, _final_results: Option<Value>) -> Result<()> {
        Ok(())
    }

    async fn fail_job(&self, _job_id: Uuid, _error_message: String, _retry: bool) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> Result<Value> {
        Ok(json!({ "type": "recording" }))
    }
}

fn service() -> (IngestService, Arc<RecordingQueue>) {
    let queue = Arc::new(RecordingQueue::default());
    (IngestService::new(queue.clone()), queue)
}

fn patient_entry(id: &str) -> Value {
    json!({
        "resource": {
            "resourceType": "Patient",
            "id": id,
            "gender": "female",
            "birthDate": "1988-04-12",
            "managingOrganization": { "reference": "Organization/fac-77" },
            "identifier": [{
                "type": { "text": "HIV Clinic No." },
                "value": "HC-0042"
            }],
            "name": [{ "given": ["Ada"], "family": "Okafor" }],
            "telecom": [{ "system": "phone", "value": "+254700000001" }]
        }
    })
}

fn encounter_entry(id: &str, patient: &str) -> Value {
    json!({
        "resource": {
            "resourceType": "Encounter",
            "id": id,
            "type": [{ "coding": [{ "code": "clinical-visit" }] }],
            "period": { "start": "2024-03-01T09:30:00Z" },
            "subject": { "reference": format!("Patient/{patient}") },
            "serviceProvider": { "reference": "Organization/fac-77" }
        }
    })
}

fn observation_entry(id: &str, patient: &str, encounter: &str, display: &str) -> Value {
    json!({
        "resource": {
            "resourceType": "Observation",
            "id": id,
            "valueString": "positive",
            "effectiveDateTime": "2024-03-01T10:00:00Z",
            "encounter": { "reference": format!("Encounter/{encounter}") },
            "subject": { "reference": format!("Patient/{patient}") },
            "code": {
                "coding": [
                    { "code": "obs-uuid-1", "display": display },
                    { "code": "123-A" }
                ]
            }
        }
    })
}

#[tokio::test]
async fn one_document_produces_one_job() {
    let (service, queue) = service();

    let document = json!({
        "resourceType": "Bundle",
        "entry": [
            patient_entry("p1"),
            encounter_entry("e1", "p1"),
            observation_entry("o1", "p1", "e1", "hiv_status"),
            observation_entry("o2", "p1", "e1", "who_stage"),
        ]
    });

    let receipt = service.submit_bundle(&document).await.unwrap();

    let jobs = queue.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_type, STAGE_BATCH_JOB_TYPE);
    assert_eq!(jobs[0].priority, JobPriority::Normal as i32);

    assert_eq!(receipt.patients, 1);
    assert_eq!(receipt.encounters, 1);
    assert_eq!(receipt.observations, 2);
}

#[tokio::test]
async fn payload_carries_normalized_rows() {
    let (service, queue) = service();

    let document = json!({
        "entry": [
            patient_entry("p1"),
            encounter_entry("e1", "p1"),
            observation_entry("o1", "p1", "e1", "hiv_status"),
        ]
    });

    service.submit_bundle(&document).await.unwrap();

    let jobs = queue.jobs();
    let payload = &jobs[0].parameters;

    let patients = payload["patients"].as_array().unwrap();
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0]["case_id"], "p1");
    assert_eq!(patients[0]["facility_id"], "fac-77");
    assert_eq!(patients[0]["clinic_number"], "HC-0042");
    assert_eq!(patients[0]["patient_name"], "Ada Okafor");

    let encounters = payload["encounters"].as_array().unwrap();
    assert_eq!(encounters.len(), 1);
    assert_eq!(encounters[0]["encounter_id"], "e1");
    assert_eq!(encounters[0]["patient_id"], "p1");

    // Observations ride inside their encounter, keyed by display name.
    let observations = encounters[0]["observations"].as_object().unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations["hiv_status"]["value"], "positive");
    assert_eq!(observations["hiv_status"]["code"], "123-A");
}

#[tokio::test]
async fn excluded_records_do_not_reach_the_payload() {
    let (service, queue) = service();

    // Patient without a gender fails inclusion; its encounter still ships.
    let mut bad_patient = patient_entry("p2");
    bad_patient["resource"]
        .as_object_mut()
        .unwrap()
        .remove("gender");

    let document = json!({
        "entry": [
            bad_patient,
            patient_entry("p1"),
            encounter_entry("e2", "p2"),
        ]
    });

    let receipt = service.submit_bundle(&document).await.unwrap();
    assert_eq!(receipt.patients, 1);
    assert_eq!(receipt.encounters, 1);

    let payload = &queue.jobs()[0].parameters;
    assert_eq!(payload["patients"][0]["case_id"], "p1");
    assert_eq!(payload["encounters"][0]["patient_id"], "p2");
}

#[tokio::test]
async fn empty_document_still_enqueues() {
    let (service, queue) = service();

    let document = json!({ "entry": [] });
    let receipt = service.submit_bundle(&document).await.unwrap();

    assert_eq!(receipt.patients, 0);
    assert_eq!(receipt.encounters, 0);
    assert_eq!(receipt.observations, 0);

    let jobs = queue.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].parameters["patients"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn document_without_entries_is_rejected() {
    let (service, queue) = service();

    let err = service
        .submit_bundle(&json!({ "resourceType": "Bundle" }))
        .await
        .unwrap_err();

    assert!(matches!(err, silo::Error::Validation(_)));
    assert!(queue.jobs().is_empty());
}

#[tokio::test]
async fn two_documents_produce_two_jobs() {
    let (service, queue) = service();

    let first = json!({ "entry": [patient_entry("p1")] });
    let second = json!({ "entry": [patient_entry("p2")] });

    service.submit_bundle(&first).await.unwrap();
    service.submit_bundle(&second).await.unwrap();

    let jobs = queue.jobs();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].parameters["patients"][0]["case_id"], "p1");
    assert_eq!(jobs[1].parameters["patients"][0]["case_id"], "p2");
}
