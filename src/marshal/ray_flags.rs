//! Per-ray visibility, sidedness and autobump masks.
//!
//! The host supplies a coarse flag (visible / double sided); primvars such as
//! `render:visibility:camera` override individual rays. The effective byte
//! is `(host & !mask) | (primvar & mask)`.

use bitflags::bitflags;

use crate::{marshal::convert, value::Value};

/// Namespace for primvars that target built-in renderer parameters.
pub const RENDER_NAMESPACE: &str = "render:";

bitflags! {
    /// Ray types a shape can be visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RayType: u8 {
        const CAMERA = 1 << 0;
        const SHADOW = 1 << 1;
        const DIFFUSE_TRANSMIT = 1 << 2;
        const SPECULAR_TRANSMIT = 1 << 3;
        const VOLUME = 1 << 4;
        const DIFFUSE_REFLECT = 1 << 5;
        const SPECULAR_REFLECT = 1 << 6;
        const SUBSURFACE = 1 << 7;
    }
}

impl RayType {
    pub fn from_ray_name(name: &str) -> Option<Self> {
        Some(match name {
            "camera" => RayType::CAMERA,
            "shadow" => RayType::SHADOW,
            "diffuse_transmit" => RayType::DIFFUSE_TRANSMIT,
            "specular_transmit" => RayType::SPECULAR_TRANSMIT,
            "volume" => RayType::VOLUME,
            "diffuse_reflect" => RayType::DIFFUSE_REFLECT,
            "specular_reflect" => RayType::SPECULAR_REFLECT,
            "subsurface" => RayType::SUBSURFACE,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayFlags {
    host: u8,
    primvar: u8,
    mask: u8,
}

impl RayFlags {
    pub fn new(host: u8) -> Self {
        Self {
            host,
            primvar: 0,
            mask: 0,
        }
    }

    pub fn set_host(&mut self, host: u8) {
        self.host = host;
    }

    /// Sets the host flag to all rays or none.
    pub fn set_host_enabled(&mut self, enabled: bool) {
        self.host = if enabled { RayType::all().bits() } else { 0 };
    }

    pub fn set_primvar(&mut self, ray: RayType, on: bool) {
        self.mask |= ray.bits();
        if on {
            self.primvar |= ray.bits();
        } else {
            self.primvar &= !ray.bits();
        }
    }

    /// Overrides every ray at once.
    pub fn set_primvar_all(&mut self, value: u8) {
        self.mask = u8::MAX;
        self.primvar = value;
    }

    pub fn clear_primvars(&mut self) {
        self.primvar = 0;
        self.mask = 0;
    }

    pub fn compose(&self) -> u8 {
        (self.host & !self.mask) | (self.primvar & self.mask)
    }
}

/// The three ray masks every shape carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeRayFlags {
    pub visibility: RayFlags,
    pub sidedness: RayFlags,
    pub autobump: RayFlags,
}

impl Default for ShapeRayFlags {
    fn default() -> Self {
        Self {
            visibility: RayFlags::new(RayType::all().bits()),
            sidedness: RayFlags::new(RayType::all().bits()),
            autobump: RayFlags::new(RayType::CAMERA.bits()),
        }
    }
}

impl ShapeRayFlags {
    pub fn clear_primvars(&mut self) {
        self.visibility.clear_primvars();
        self.sidedness.clear_primvars();
        self.autobump.clear_primvars();
    }

    /// Consumes a ray-flag primvar. Returns `false` when `name` is not one.
    pub fn apply_primvar(&mut self, name: &str, value: &Value) -> bool {
        let Some(rest) = name.strip_prefix(RENDER_NAMESPACE) else {
            return false;
        };
        if rest == "visibility" {
            if let Some(byte) = convert::to_byte(value) {
                self.visibility.set_primvar_all(byte);
            }
            return true;
        }
        let (flags, ray_name) = if let Some(ray) = rest.strip_prefix("visibility:") {
            (&mut self.visibility, ray)
        } else if let Some(ray) = rest.strip_prefix("sidedness:") {
            (&mut self.sidedness, ray)
        } else if let Some(ray) = rest.strip_prefix("autobump_visibility:") {
            (&mut self.autobump, ray)
        } else {
            return false;
        };
        let Some(ray) = RayType::from_ray_name(ray_name) else {
            return false;
        };
        if let Some(on) = convert::to_bool(value) {
            flags.set_primvar(ray, on);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_names_are_lowercase_primvar_suffixes() {
        assert_eq!(RayType::from_ray_name("camera"), Some(RayType::CAMERA));
        assert_eq!(RayType::from_ray_name("subsurface"), Some(RayType::SUBSURFACE));
        assert_eq!(RayType::from_ray_name("CAMERA"), None);
        assert_eq!(RayType::from_name("CAMERA"), Some(RayType::CAMERA));
    }

    #[test]
    fn test_primvar_overrides_single_ray() {
        let mut flags = RayFlags::new(RayType::all().bits());
        flags.set_primvar(RayType::CAMERA, false);
        assert_eq!(flags.compose(), RayType::all().bits() & !RayType::CAMERA.bits());

        flags.set_host(0);
        flags.set_primvar(RayType::SHADOW, true);
        assert_eq!(flags.compose(), RayType::SHADOW.bits());

        flags.clear_primvars();
        assert_eq!(flags.compose(), 0);
    }

    #[test]
    fn test_apply_primvar_routes_by_prefix() {
        let mut set = ShapeRayFlags::default();
        assert!(set.apply_primvar("render:visibility:camera", &Value::Bool(false)));
        assert!(set.apply_primvar("render:sidedness:shadow", &Value::Int(0)));
        assert!(set.apply_primvar("render:autobump_visibility:diffuse_reflect", &Value::Bool(true)));
        assert!(!set.apply_primvar("render:visibility:bogus", &Value::Bool(true)));
        assert!(!set.apply_primvar("displayColor", &Value::Bool(true)));

        assert_eq!(set.visibility.compose() & RayType::CAMERA.bits(), 0);
        assert_eq!(set.sidedness.compose() & RayType::SHADOW.bits(), 0);
        assert_eq!(
            set.autobump.compose(),
            (RayType::CAMERA | RayType::DIFFUSE_REFLECT).bits()
        );
    }

    #[test]
    fn test_whole_visibility_byte() {
        let mut set = ShapeRayFlags::default();
        set.visibility.set_host_enabled(false);
        assert!(set.apply_primvar("render:visibility", &Value::Int(3)));
        assert_eq!(set.visibility.compose(), 3);
    }
}
