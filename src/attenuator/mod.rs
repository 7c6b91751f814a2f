//! Attenuation-driven forced roaming
//!
//! The controller is the only writer of attenuator state. It keeps a cache of
//! every value it has commanded and never reads values back from hardware.

use crate::error::{AppError, Result};
use crate::types::ModuleId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One programmable attenuator as reported by the control channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttenuatorInfo {
    pub serial: String,
    pub module_count: u8,
    /// Listed by the manager but not physically present
    pub phantom: bool,
}

impl AttenuatorInfo {
    pub fn modules(&self) -> impl Iterator<Item = ModuleId> + '_ {
        (0..self.module_count).map(move |index| ModuleId::new(self.serial.clone(), index))
    }
}

/// Control channel to the attenuator hardware
#[async_trait]
pub trait AttenuatorChannel: Send + Sync {
    /// Apply a value (deci-dB) to one module
    async fn set_module(&self, module: &ModuleId, value: u16) -> Result<()>;

    /// List attenuators known to the controller
    async fn list_attenuators(&self) -> Result<Vec<AttenuatorInfo>>;
}

/// Mirrored attenuation ramps shared by the active and passive sets
#[derive(Debug, Clone, PartialEq)]
pub struct RampSchedule {
    increasing: Vec<u16>,
    decreasing: Vec<u16>,
}

impl RampSchedule {
    /// `increasing` walks `0, step, 2*step, ...` and always ends at `max`;
    /// `decreasing` walks the same steps down from `max` and ends at 0.
    pub fn new(step: u16, max: u16) -> Result<Self> {
        if step == 0 {
            return Err(AppError::config("Attenuation step must be greater than 0"));
        }

        let mut increasing: Vec<u16> = (0..max).step_by(step as usize).collect();
        increasing.push(max);

        let mut decreasing: Vec<u16> = (1..=max).rev().step_by(step as usize).collect();
        decreasing.push(0);

        let len = increasing.len().max(decreasing.len());
        pad_with_last(&mut increasing, len);
        pad_with_last(&mut decreasing, len);

        Ok(Self { increasing, decreasing })
    }

    pub fn len(&self) -> usize {
        self.increasing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.increasing.is_empty()
    }

    /// `(active, passive)` values for step `i`
    pub fn at(&self, i: usize) -> Option<(u16, u16)> {
        Some((*self.increasing.get(i)?, *self.decreasing.get(i)?))
    }

    pub fn increasing(&self) -> &[u16] {
        &self.increasing
    }

    pub fn decreasing(&self) -> &[u16] {
        &self.decreasing
    }
}

fn pad_with_last(values: &mut Vec<u16>, len: usize) {
    if let Some(&last) = values.last() {
        values.resize(len, last);
    }
}

/// Drives the attenuator modules of a roam test
pub struct AttenuationController {
    channel: Arc<dyn AttenuatorChannel>,
    groups: Vec<Vec<ModuleId>>,
    max: u16,
    schedule: RampSchedule,
    cache: BTreeMap<ModuleId, u16>,
    quiesced: BTreeSet<ModuleId>,
    active: Vec<ModuleId>,
    passive: Vec<ModuleId>,
}

impl AttenuationController {
    pub fn new(channel: Arc<dyn AttenuatorChannel>, groups: Vec<Vec<ModuleId>>, step: u16, max: u16) -> Result<Self> {
        Ok(Self {
            channel,
            groups,
            max,
            schedule: RampSchedule::new(step, max)?,
            cache: BTreeMap::new(),
            quiesced: BTreeSet::new(),
            active: Vec::new(),
            passive: Vec::new(),
        })
    }

    pub fn schedule(&self) -> &RampSchedule {
        &self.schedule
    }

    pub fn groups(&self) -> &[Vec<ModuleId>] {
        &self.groups
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    /// Last value commanded for a module
    pub fn value(&self, module: &ModuleId) -> Option<u16> {
        self.cache.get(module).copied()
    }

    pub fn active(&self) -> &[ModuleId] {
        &self.active
    }

    pub fn passive(&self) -> &[ModuleId] {
        &self.passive
    }

    /// Discover every module on every present attenuator
    pub async fn discover_modules(&self) -> Result<Vec<ModuleId>> {
        let attenuators = self.channel.list_attenuators().await?;
        Ok(attenuators
            .iter()
            .filter(|a| !a.phantom)
            .flat_map(|a| a.modules())
            .collect())
    }

    /// Baseline: every known module to 0
    pub async fn initialize(&mut self, all_modules: &[ModuleId]) -> Result<()> {
        for module in all_modules {
            self.set(module, 0).await?;
        }
        Ok(())
    }

    /// Park every module outside the test at max, skipping phantom attenuators
    pub async fn quiesce_unused(&mut self, modules_not_in_test: &[ModuleId]) -> Result<()> {
        let phantoms: BTreeSet<String> = self
            .channel
            .list_attenuators()
            .await?
            .into_iter()
            .filter(|a| a.phantom)
            .map(|a| a.serial)
            .collect();

        for module in modules_not_in_test {
            if phantoms.contains(&module.serial) {
                continue;
            }
            self.set(module, self.max).await?;
            self.quiesced.insert(module.clone());
        }
        Ok(())
    }

    /// Active set to 0, passive set to max, every other in-test group parked at max
    pub async fn assign_pair(&mut self, active: &[ModuleId], passive: &[ModuleId]) -> Result<()> {
        let active_set: BTreeSet<&ModuleId> = active.iter().collect();
        if let Some(module) = passive.iter().find(|m| active_set.contains(m)) {
            return Err(AppError::config(format!(
                "Module {} is in both the active and the passive set",
                module
            )));
        }
        if let Some(module) = active.iter().chain(passive).find(|m| self.quiesced.contains(*m)) {
            return Err(AppError::config(format!(
                "Module {} was quiesced and cannot take part in a transition",
                module
            )));
        }

        self.active = active.to_vec();
        self.passive = passive.to_vec();
        self.apply_roles().await
    }

    /// Re-apply the held roles (active 0, passive max, other groups parked)
    /// without changing which set is which
    pub async fn rebaseline(&mut self) -> Result<()> {
        if self.active.is_empty() || self.passive.is_empty() {
            return Err(AppError::internal("No attenuator pair has been assigned"));
        }
        self.apply_roles().await
    }

    /// Whether the controller already holds exactly this active/passive split
    pub fn holds_roles(&self, active: &[ModuleId], passive: &[ModuleId]) -> bool {
        !self.active.is_empty() && self.active == active && self.passive == passive
    }

    /// Group indexes of the active and passive sets currently held
    pub fn held_groups(&self) -> Option<(usize, usize)> {
        let index = |set: &[ModuleId]| self.groups.iter().position(|g| g.as_slice() == set);
        if self.active.is_empty() {
            return None;
        }
        Some((index(&self.active)?, index(&self.passive)?))
    }

    async fn apply_roles(&mut self) -> Result<()> {
        let active = self.active.clone();
        let passive = self.passive.clone();
        for module in &active {
            self.set(module, 0).await?;
        }
        for module in &passive {
            self.set(module, self.max).await?;
        }

        let idle: Vec<ModuleId> = self
            .groups
            .iter()
            .flatten()
            .filter(|m| !active.contains(*m) && !passive.contains(*m))
            .cloned()
            .collect();
        for module in &idle {
            self.set(module, self.max).await?;
        }

        Ok(())
    }

    /// Apply ramp step `i` to the active and passive sets
    pub async fn step(&mut self, i: usize) -> Result<()> {
        let (up, down) = self.schedule.at(i).ok_or_else(|| {
            AppError::internal(format!("Ramp step {} out of range (len {})", i, self.schedule.len()))
        })?;

        let active = self.active.clone();
        let passive = self.passive.clone();
        for module in &active {
            self.set(module, up).await?;
        }
        for module in &passive {
            self.set(module, down).await?;
        }
        Ok(())
    }

    /// The set ramped down becomes the one ramped up next, and vice versa
    pub fn swap_roles(&mut self) {
        std::mem::swap(&mut self.active, &mut self.passive);
    }

    async fn set(&mut self, module: &ModuleId, value: u16) -> Result<()> {
        if value > self.max {
            return Err(AppError::hardware(format!(
                "Refusing value {} for {} above maximum {}",
                value, module, self.max
            )));
        }

        self.channel
            .set_module(module, value)
            .await
            .map_err(|e| AppError::hardware(format!("{} rejected value {}: {}", module, value, e)))?;
        self.cache.insert(module.clone(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        writes: Mutex<Vec<(ModuleId, u16)>>,
        attenuators: Vec<AttenuatorInfo>,
        reject_above: Option<u16>,
    }

    #[async_trait]
    impl AttenuatorChannel for RecordingChannel {
        async fn set_module(&self, module: &ModuleId, value: u16) -> Result<()> {
            if self.reject_above.map_or(false, |limit| value > limit) {
                return Err(AppError::http("400 Bad Request"));
            }
            self.writes.lock().unwrap().push((module.clone(), value));
            Ok(())
        }

        async fn list_attenuators(&self) -> Result<Vec<AttenuatorInfo>> {
            Ok(self.attenuators.clone())
        }
    }

    fn module(index: u8) -> ModuleId {
        ModuleId::new("1.1.3034", index)
    }

    fn controller(channel: Arc<RecordingChannel>) -> AttenuationController {
        let groups = vec![vec![module(0), module(1)], vec![module(2), module(3)], vec![module(4)]];
        AttenuationController::new(channel, groups, 100, 950).unwrap()
    }

    #[test]
    fn test_schedule_shape() {
        let schedule = RampSchedule::new(100, 950).unwrap();
        assert_eq!(schedule.len(), 11);
        assert_eq!(schedule.increasing().first(), Some(&0));
        assert_eq!(schedule.increasing().last(), Some(&950));
        assert_eq!(schedule.decreasing().first(), Some(&950));
        assert_eq!(schedule.decreasing().last(), Some(&0));
        assert_eq!(schedule.at(1), Some((100, 850)));
        assert_eq!(schedule.at(11), None);
    }

    #[test]
    fn test_schedule_exact_multiple() {
        let schedule = RampSchedule::new(250, 500).unwrap();
        assert_eq!(schedule.increasing(), &[0, 250, 500]);
        assert_eq!(schedule.decreasing(), &[500, 250, 0]);
    }

    #[test]
    fn test_schedule_rejects_zero_step() {
        assert!(RampSchedule::new(0, 950).is_err());
    }

    proptest! {
        #[test]
        fn prop_ramps_mirror(step in 1u16..=955, max in 0u16..=955) {
            let schedule = RampSchedule::new(step, max).unwrap();
            prop_assert_eq!(schedule.increasing().len(), schedule.decreasing().len());
            prop_assert_eq!(*schedule.increasing().last().unwrap(), max);
            prop_assert_eq!(*schedule.decreasing().last().unwrap(), 0);
            for i in 0..schedule.len() {
                let (up, down) = schedule.at(i).unwrap();
                prop_assert_eq!(up + down, max);
            }
        }
    }

    #[tokio::test]
    async fn test_assign_pair_parks_other_groups() {
        let channel = Arc::new(RecordingChannel::default());
        let mut ctl = controller(channel.clone());

        ctl.assign_pair(&[module(0), module(1)], &[module(2), module(3)]).await.unwrap();

        assert_eq!(ctl.value(&module(0)), Some(0));
        assert_eq!(ctl.value(&module(1)), Some(0));
        assert_eq!(ctl.value(&module(2)), Some(950));
        assert_eq!(ctl.value(&module(3)), Some(950));
        assert_eq!(ctl.value(&module(4)), Some(950));
    }

    #[tokio::test]
    async fn test_assign_pair_rejects_overlap() {
        let channel = Arc::new(RecordingChannel::default());
        let mut ctl = controller(channel.clone());

        let err = ctl.assign_pair(&[module(0)], &[module(0), module(2)]).await.unwrap_err();
        assert_eq!(err.category(), "CONFIG");
        assert!(channel.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assign_pair_rejects_quiesced_module() {
        let channel = Arc::new(RecordingChannel::default());
        let mut ctl = controller(channel.clone());

        ctl.quiesce_unused(&[module(7)]).await.unwrap();
        let err = ctl.assign_pair(&[module(7)], &[module(2)]).await.unwrap_err();
        assert!(err.to_string().contains("quiesced"));
    }

    #[tokio::test]
    async fn test_step_drives_both_sets() {
        let channel = Arc::new(RecordingChannel::default());
        let mut ctl = controller(channel.clone());
        ctl.assign_pair(&[module(0)], &[module(2)]).await.unwrap();

        ctl.step(3).await.unwrap();
        assert_eq!(ctl.value(&module(0)), Some(300));
        assert_eq!(ctl.value(&module(2)), Some(650));

        let last = ctl.schedule().len() - 1;
        ctl.step(last).await.unwrap();
        assert_eq!(ctl.value(&module(0)), Some(950));
        assert_eq!(ctl.value(&module(2)), Some(0));

        assert!(ctl.step(last + 1).await.is_err());
    }

    #[tokio::test]
    async fn test_swap_roles() {
        let channel = Arc::new(RecordingChannel::default());
        let mut ctl = controller(channel);
        ctl.assign_pair(&[module(0)], &[module(2)]).await.unwrap();
        ctl.swap_roles();
        assert_eq!(ctl.active(), &[module(2)]);
        assert_eq!(ctl.passive(), &[module(0)]);
    }

    #[tokio::test]
    async fn test_swapped_roles_drive_next_ramp() {
        let channel = Arc::new(RecordingChannel::default());
        let mut ctl = controller(channel.clone());
        ctl.assign_pair(&[module(0), module(1)], &[module(2), module(3)]).await.unwrap();
        assert_eq!(ctl.held_groups(), Some((0, 1)));

        for i in 0..ctl.schedule().len() {
            ctl.step(i).await.unwrap();
        }
        ctl.swap_roles();
        assert_eq!(ctl.held_groups(), Some((1, 0)));
        assert!(ctl.holds_roles(&[module(2), module(3)], &[module(0), module(1)]));

        ctl.rebaseline().await.unwrap();
        ctl.step(1).await.unwrap();
        assert_eq!(ctl.value(&module(2)), Some(100));
        assert_eq!(ctl.value(&module(3)), Some(100));
        assert_eq!(ctl.value(&module(0)), Some(850));
        assert_eq!(ctl.value(&module(4)), Some(950));
    }

    #[tokio::test]
    async fn test_rebaseline_needs_assigned_pair() {
        let channel = Arc::new(RecordingChannel::default());
        let mut ctl = controller(channel.clone());
        assert_eq!(ctl.held_groups(), None);
        assert!(ctl.rebaseline().await.is_err());
        assert!(channel.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let channel = Arc::new(RecordingChannel::default());
        let mut ctl = controller(channel.clone());
        let all: Vec<ModuleId> = (0..8).map(module).collect();

        ctl.initialize(&all).await.unwrap();
        ctl.initialize(&all).await.unwrap();
        assert!(all.iter().all(|m| ctl.value(m) == Some(0)));
        assert_eq!(channel.writes.lock().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_quiesce_skips_phantoms() {
        let channel = Arc::new(RecordingChannel {
            attenuators: vec![
                AttenuatorInfo { serial: "1.1.3034".to_string(), module_count: 8, phantom: false },
                AttenuatorInfo { serial: "1.1.9999".to_string(), module_count: 8, phantom: true },
            ],
            ..Default::default()
        });
        let mut ctl = controller(channel.clone());

        ctl.quiesce_unused(&[module(6), ModuleId::new("1.1.9999", 0)]).await.unwrap();
        let writes = channel.writes.lock().unwrap();
        assert_eq!(writes.as_slice(), &[(module(6), 950)]);
        drop(writes);

        let discovered = ctl.discover_modules().await.unwrap();
        assert_eq!(discovered.len(), 8);
        assert!(discovered.iter().all(|m| m.serial == "1.1.3034"));
    }

    #[tokio::test]
    async fn test_rejected_value_is_hardware_error() {
        let channel = Arc::new(RecordingChannel { reject_above: Some(200), ..Default::default() });
        let mut ctl = AttenuationController::new(channel, vec![vec![module(0)], vec![module(1)]], 100, 300).unwrap();
        let err = ctl.assign_pair(&[module(0)], &[module(1)]).await.unwrap_err();
        assert_eq!(err.category(), "HARDWARE");
        assert!(err.to_string().contains("rejected value 300"));
    }
}
