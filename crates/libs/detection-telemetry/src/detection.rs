//! Detection records supplied by the perception pipeline

use serde::{Deserialize, Serialize};

use crate::config::ClassConfig;

/// Object classes the reporter distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Person,
    Vehicle,
    Bicycle,
    RoadSign,
    /// Any class id the mapping does not know
    Other(u32),
}

impl ObjectClass {
    /// Whether detections of this class count towards the person tally
    pub fn is_person(self) -> bool {
        matches!(self, ObjectClass::Person)
    }

    /// Vehicles and bicycles are reported together
    pub fn is_vehicle(self) -> bool {
        matches!(self, ObjectClass::Vehicle | ObjectClass::Bicycle)
    }
}

/// Axis-aligned bounding box in source-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Center point of the box
    pub fn center(&self) -> (f32, f32) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

/// One classified, localized object in a single frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: ObjectClass,
    pub bbox: BoundingBox,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl Detection {
    pub fn new(class: ObjectClass, bbox: BoundingBox) -> Self {
        Self {
            class,
            bbox,
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Maps raw inference class ids onto [`ObjectClass`]
///
/// Different model label files number their classes differently; the map
/// is built from configuration so one reporter serves all of them.
#[derive(Debug, Clone)]
pub struct ClassMap {
    person: Vec<u32>,
    vehicle: Vec<u32>,
    bicycle: Vec<u32>,
    road_sign: Vec<u32>,
}

impl ClassMap {
    pub fn from_config(config: &ClassConfig) -> Self {
        Self {
            person: config.person.clone(),
            vehicle: config.vehicle.clone(),
            bicycle: config.bicycle.clone(),
            road_sign: config.road_sign.clone(),
        }
    }

    /// Resolve a raw class id; the first matching list wins
    pub fn classify(&self, class_id: u32) -> ObjectClass {
        if self.person.contains(&class_id) {
            ObjectClass::Person
        } else if self.vehicle.contains(&class_id) {
            ObjectClass::Vehicle
        } else if self.bicycle.contains(&class_id) {
            ObjectClass::Bicycle
        } else if self.road_sign.contains(&class_id) {
            ObjectClass::RoadSign
        } else {
            ObjectClass::Other(class_id)
        }
    }

    /// Build a detection from a raw class id and box
    pub fn detection(&self, class_id: u32, bbox: BoundingBox, confidence: f32) -> Detection {
        Detection::new(self.classify(class_id), bbox).with_confidence(confidence)
    }
}

impl Default for ClassMap {
    fn default() -> Self {
        Self::from_config(&ClassConfig::default())
    }
}
