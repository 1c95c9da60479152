//! Static description of the triage components and how patients flow between
//! them, for whoever draws the architecture diagrams. Rendering is not done
//! here; a `TopologyRenderer` receives the description.

use std::io::Write;

use serde::Serialize;

use crate::config::QueueMode;
use crate::error::TriageResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Person,
    Container,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub name: String,
    pub kind: ComponentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    pub name: String,
    pub components: Vec<Component>,
    pub relationships: Vec<Relationship>,
}

pub trait TopologyRenderer {
    fn render(&self, topology: &Topology, out: &mut dyn Write) -> TriageResult<()>;
}

/// Writes the topology as pretty JSON.
pub struct JsonExport;

impl TopologyRenderer for JsonExport {
    fn render(&self, topology: &Topology, out: &mut dyn Write) -> TriageResult<()> {
        serde_json::to_writer_pretty(&mut *out, topology)?;
        writeln!(out)?;
        Ok(())
    }
}

const PATIENT: &str = "Patient";
const DOCTOR: &str = "Doctor";

impl Topology {
    fn new(name: &str) -> Topology {
        Topology {
            name: name.to_string(),
            components: Vec::new(),
            relationships: Vec::new(),
        }
    }

    fn component(
        mut self,
        name: &str,
        kind: ComponentKind,
        description: Option<&str>,
        boundary: Option<&str>,
    ) -> Topology {
        self.components.push(Component {
            name: name.to_string(),
            kind,
            description: description.map(str::to_string),
            boundary: boundary.map(str::to_string),
        });
        self
    }

    fn relationship(mut self, source: &str, target: &str, label: Option<&str>) -> Topology {
        self.relationships.push(Relationship {
            source: source.to_string(),
            target: target.to_string(),
            label: label.map(str::to_string),
        });
        self
    }

    fn with_patient_stream(self) -> Topology {
        self.component(
            PATIENT,
            ComponentKind::Person,
            Some("Asynchronous arrival"),
            Some("PatientStream"),
        )
    }

    fn with_doctor_queue(self) -> Topology {
        self.component(DOCTOR, ComponentKind::Person, Some("FCFS queue"), Some("DoctorQueue"))
    }

    pub fn component_named(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }
}

pub fn single_queue_topology() -> Topology {
    let queue = "Hybrid Priority Queue";
    Topology::new("DeSERT Hybrid Single-Queue")
        .with_patient_stream()
        .component(queue, ComponentKind::Container, None, None)
        .with_doctor_queue()
        .relationship(PATIENT, queue, Some("Enters triaging queue for processing"))
        .relationship(queue, DOCTOR, Some("Highest priority patient is seen"))
}

pub fn multi_queue_topology() -> Topology {
    let levels = [
        ("Queue Level 1", "Severity score-based priority queue"),
        ("Queue Level 2", "FCFS queue based on time-of-arrival"),
        ("Queue Level 3", "SJF queue based on time-to-treat"),
    ];

    let mut topology = Topology::new("DeSERT Multi-Queue").with_patient_stream();
    for (name, description) in levels {
        topology = topology.component(name, ComponentKind::Container, Some(description), Some("MultiQueue"));
    }
    topology = topology.with_doctor_queue();

    for (name, _) in levels {
        topology = topology.relationship(PATIENT, name, None);
    }
    topology
        .relationship(levels[0].0, DOCTOR, None)
        .relationship(
            levels[1].0,
            DOCTOR,
            Some("Consensus among queues for position closest to front of queue"),
        )
        .relationship(levels[2].0, DOCTOR, None)
}

pub fn topology_for(mode: QueueMode) -> Topology {
    match mode {
        QueueMode::Single => single_queue_topology(),
        QueueMode::Multi => multi_queue_topology(),
    }
}
