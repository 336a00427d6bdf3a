//! Target register-file configuration.
//!
//! A [`TargetConfig`] is the serializable description of a machine's
//! registers: their names, which storage they share, the register classes
//! with their allocation orders, and the few calling-convention facts the
//! allocator's hint provider and spill rewriter need. It is turned into an
//! index-based [`RegisterFile`] by [`TargetConfig::build`].
//!
//! # Presets
//!
//! | Preset | Registers | Use Case |
//! |--------|-----------|----------|
//! | `default` | 16 (13 allocatable) | RISC-style GPR file |
//! | `tiny` | 2 allocatable | Register-pressure testing |
//! | `paired` | 4 single + 2 double (aliased) + 3 GPR | Sub-register aliasing |

use super::registers::{PhysReg, RegClassId, RegUnit, RegisterClass, RegisterFile, RegisterInfo};
use serde::{Deserialize, Serialize};

/// Description of one physical register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSpec {
    /// Assembly name
    pub name: String,
    /// Registers whose storage this register overlays. Empty means the
    /// register has storage of its own.
    #[serde(default)]
    pub covers: Vec<String>,
}

/// Description of one register class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSpec {
    /// Class name
    pub name: String,
    /// Register names in allocation order
    pub order: Vec<String>,
}

/// Target configuration for register allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target name
    pub name: String,
    /// Physical registers
    pub registers: Vec<RegisterSpec>,
    /// Register classes
    pub classes: Vec<ClassSpec>,
    /// Class for virtual registers without an explicit class
    pub default_class: String,
    /// Argument registers, in parameter order
    #[serde(default)]
    pub arg_regs: Vec<String>,
    /// Return-value registers
    #[serde(default)]
    pub ret_regs: Vec<String>,
    /// Registers preserved across calls
    #[serde(default)]
    pub callee_saved: Vec<String>,
    /// Base register for spill slots (must not be allocatable)
    pub frame_pointer: String,
    /// Bytes per spill slot
    #[serde(default = "default_slot_size")]
    pub slot_size: u32,
}

fn default_slot_size() -> u32 {
    4
}

fn reg(name: &str) -> RegisterSpec {
    RegisterSpec { name: name.to_string(), covers: Vec::new() }
}

fn overlay(name: &str, covers: &[&str]) -> RegisterSpec {
    RegisterSpec {
        name: name.to_string(),
        covers: covers.iter().map(|s| s.to_string()).collect(),
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for TargetConfig {
    /// Default configuration: the 16-register file.
    fn default() -> Self {
        Self::standard()
    }
}

impl TargetConfig {
    /// 16 general-purpose registers; zero, sp and fp are reserved.
    pub fn standard() -> Self {
        let all = [
            "zero", "ra", "sp", "fp", "a0", "a1", "a2", "a3",
            "a4", "a5", "s0", "s1", "s2", "s3", "t0", "t1",
        ];
        Self {
            name: "default".to_string(),
            registers: all.iter().map(|n| reg(n)).collect(),
            classes: vec![ClassSpec {
                name: "gpr".to_string(),
                order: names(&[
                    "ra", "a0", "a1", "a2", "a3", "a4", "a5",
                    "s0", "s1", "s2", "s3", "t0", "t1",
                ]),
            }],
            default_class: "gpr".to_string(),
            arg_regs: names(&["a0", "a1", "a2", "a3", "a4", "a5"]),
            ret_regs: names(&["a0", "a1"]),
            callee_saved: names(&["sp", "fp", "s0", "s1", "s2", "s3"]),
            frame_pointer: "fp".to_string(),
            slot_size: 4,
        }
    }

    /// Two allocatable registers, for exercising spilling.
    pub fn tiny() -> Self {
        Self {
            name: "tiny".to_string(),
            registers: vec![reg("fp"), reg("x0"), reg("x1")],
            classes: vec![ClassSpec {
                name: "gpr".to_string(),
                order: names(&["x0", "x1"]),
            }],
            default_class: "gpr".to_string(),
            arg_regs: names(&["x0", "x1"]),
            ret_regs: names(&["x0"]),
            callee_saved: Vec::new(),
            frame_pointer: "fp".to_string(),
            slot_size: 4,
        }
    }

    /// Single-precision registers overlaid pairwise by double-precision ones.
    pub fn paired() -> Self {
        Self {
            name: "paired".to_string(),
            registers: vec![
                reg("fp"),
                reg("x0"),
                reg("x1"),
                reg("x2"),
                reg("s0"),
                reg("s1"),
                reg("s2"),
                reg("s3"),
                overlay("d0", &["s0", "s1"]),
                overlay("d1", &["s2", "s3"]),
            ],
            classes: vec![
                ClassSpec { name: "gpr".to_string(), order: names(&["x0", "x1", "x2"]) },
                ClassSpec { name: "fpr32".to_string(), order: names(&["s0", "s1", "s2", "s3"]) },
                ClassSpec { name: "fpr64".to_string(), order: names(&["d0", "d1"]) },
            ],
            default_class: "gpr".to_string(),
            arg_regs: names(&["x0", "x1"]),
            ret_regs: names(&["x0"]),
            callee_saved: names(&["x2"]),
            frame_pointer: "fp".to_string(),
            slot_size: 8,
        }
    }

    /// Get a preset configuration by name.
    ///
    /// Available presets:
    /// - `"default"`: 16-register file, 13 allocatable
    /// - `"tiny"`: two allocatable registers
    /// - `"paired"`: aliased single/double floating-point registers
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "default" => Some(Self::standard()),
            "tiny" => Some(Self::tiny()),
            "paired" => Some(Self::paired()),
            _ => None,
        }
    }

    /// List available preset names.
    pub fn preset_names() -> &'static [&'static str] {
        &["default", "tiny", "paired"]
    }

    /// Validate the configuration without keeping the result.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build().map(|_| ())
    }

    /// Resolve names and storage units into a [`RegisterFile`].
    pub fn build(&self) -> Result<RegisterFile, ConfigError> {
        if self.registers.is_empty() {
            return Err(ConfigError::NoRegisters);
        }

        let mut regs: Vec<RegisterInfo> = Vec::with_capacity(self.registers.len());
        let mut num_units = 0u16;

        for spec in &self.registers {
            if regs.iter().any(|r| r.name == spec.name) {
                return Err(ConfigError::DuplicateRegister(spec.name.clone()));
            }

            let units = if spec.covers.is_empty() {
                let unit = RegUnit(num_units);
                num_units += 1;
                vec![unit]
            } else {
                // Overlays may only name registers defined before them.
                let mut units = Vec::new();
                for covered in &spec.covers {
                    let info = regs
                        .iter()
                        .find(|r| &r.name == covered)
                        .ok_or_else(|| ConfigError::UnknownRegister(covered.clone()))?;
                    for unit in &info.units {
                        if !units.contains(unit) {
                            units.push(*unit);
                        }
                    }
                }
                units
            };

            regs.push(RegisterInfo { name: spec.name.clone(), units });
        }

        let lookup = |name: &String| -> Result<PhysReg, ConfigError> {
            regs.iter()
                .position(|r| &r.name == name)
                .map(|i| PhysReg(i as u16))
                .ok_or_else(|| ConfigError::UnknownRegister(name.clone()))
        };
        let lookup_all = |list: &[String]| -> Result<Vec<PhysReg>, ConfigError> {
            list.iter().map(lookup).collect()
        };

        let frame_pointer = lookup(&self.frame_pointer)?;

        let mut classes: Vec<RegisterClass> = Vec::with_capacity(self.classes.len());
        for spec in &self.classes {
            if classes.iter().any(|c| c.name == spec.name) {
                return Err(ConfigError::DuplicateClass(spec.name.clone()));
            }
            let order = lookup_all(&spec.order)?;
            for &r in &order {
                if regs[r.index()].units.iter().any(|u| regs[frame_pointer.index()].units.contains(u)) {
                    return Err(ConfigError::ReservedInClass {
                        class: spec.name.clone(),
                        reg: regs[r.index()].name.clone(),
                    });
                }
            }
            classes.push(RegisterClass { name: spec.name.clone(), order });
        }

        let default_class = classes
            .iter()
            .position(|c| c.name == self.default_class)
            .map(|i| RegClassId(i as u16))
            .ok_or_else(|| ConfigError::UnknownClass(self.default_class.clone()))?;

        if self.slot_size == 0 {
            return Err(ConfigError::ZeroSlotSize);
        }

        Ok(RegisterFile {
            arg_regs: lookup_all(&self.arg_regs)?,
            ret_regs: lookup_all(&self.ret_regs)?,
            callee_saved: lookup_all(&self.callee_saved)?,
            regs,
            classes,
            num_units: num_units as usize,
            default_class,
            frame_pointer,
            slot_size: self.slot_size,
        })
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("target defines no registers")]
    NoRegisters,

    #[error("register '{0}' is defined twice")]
    DuplicateRegister(String),

    #[error("unknown register '{0}'")]
    UnknownRegister(String),

    #[error("register class '{0}' is defined twice")]
    DuplicateClass(String),

    #[error("unknown register class '{0}'")]
    UnknownClass(String),

    #[error("class '{class}' contains '{reg}', which overlaps the frame pointer")]
    ReservedInClass { class: String, reg: String },

    #[error("spill slot size must be non-zero")]
    ZeroSlotSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_build() {
        for name in TargetConfig::preset_names() {
            let config = TargetConfig::preset(name).expect("preset should exist");
            assert!(config.validate().is_ok(), "preset {} should be valid", name);
        }
        assert!(TargetConfig::preset("nonexistent").is_none());
        assert_eq!(TargetConfig::preset("Default"), Some(TargetConfig::standard()));
        assert_eq!(TargetConfig::default().name, "default");
    }

    #[test]
    fn test_unknown_register_in_class() {
        let mut config = TargetConfig::tiny();
        config.classes[0].order.push("x9".to_string());
        assert_eq!(config.validate(), Err(ConfigError::UnknownRegister("x9".to_string())));
    }

    #[test]
    fn test_duplicate_register() {
        let mut config = TargetConfig::tiny();
        config.registers.push(reg("x0"));
        assert_eq!(config.validate(), Err(ConfigError::DuplicateRegister("x0".to_string())));
    }

    #[test]
    fn test_frame_pointer_not_allocatable() {
        let mut config = TargetConfig::tiny();
        config.classes[0].order.push("fp".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::ReservedInClass { .. })));
    }

    #[test]
    fn test_unknown_default_class() {
        let mut config = TargetConfig::tiny();
        config.default_class = "vec".to_string();
        assert_eq!(config.validate(), Err(ConfigError::UnknownClass("vec".to_string())));
    }

    #[test]
    fn test_empty_class_is_valid_config() {
        // An empty class is only an error once something is allocated in it.
        let mut config = TargetConfig::tiny();
        config.classes.push(ClassSpec { name: "vec".to_string(), order: Vec::new() });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serde_roundtrip_preserves_overlays() {
        let config = TargetConfig::paired();
        let json = serde_json::to_string(&config).unwrap();
        let back: TargetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_slot_size_defaults() {
        let json = r#"{
            "name": "mini",
            "registers": [{"name": "fp"}, {"name": "r0"}],
            "classes": [{"name": "gpr", "order": ["r0"]}],
            "default_class": "gpr",
            "frame_pointer": "fp"
        }"#;
        let config: TargetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.slot_size, 4);
        let file = config.build().unwrap();
        assert_eq!(file.num_regs(), 2);
        assert!(file.arg_regs().is_empty());
    }
}
