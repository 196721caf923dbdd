// MIDI output port discovery

use super::MidiError;
use midir::{MidiOutput, MidiOutputPort};

const CLIENT_NAME: &str = "stepseq";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

pub struct MidiDeviceManager;

impl MidiDeviceManager {
    pub fn new() -> Self {
        Self
    }

    /// List all available MIDI output ports
    pub fn list_output_ports(&self) -> Result<Vec<MidiDeviceInfo>, MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let names = midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect::<Vec<_>>();
        Ok(describe_ports(names))
    }

    /// Find an output port by name, or the first port when `name` is None.
    ///
    /// An exact name match wins; otherwise the first port whose name contains
    /// `name` (case-insensitive) is used.
    pub fn find_output_port(
        &self,
        name: Option<&str>,
    ) -> Result<(MidiOutput, MidiOutputPort, String), MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let ports = midi_out.ports();
        if ports.is_empty() {
            return Err(MidiError::NoPorts);
        }

        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_default())
            .collect();

        let index = match name {
            None => 0,
            Some(wanted) => match_port_name(&names, wanted)
                .ok_or_else(|| MidiError::PortNotFound(wanted.to_string()))?,
        };

        let port = ports[index].clone();
        let port_name = names[index].clone();
        Ok((midi_out, port, port_name))
    }
}

impl Default for MidiDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_ports(names: Vec<String>) -> Vec<MidiDeviceInfo> {
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| MidiDeviceInfo {
            id: format!("midi_out_{}", index),
            name,
            // The first port is the default target
            is_default: index == 0,
        })
        .collect()
}

fn match_port_name(names: &[String], wanted: &str) -> Option<usize> {
    if let Some(index) = names.iter().position(|n| n == wanted) {
        return Some(index);
    }
    let wanted = wanted.to_lowercase();
    names
        .iter()
        .position(|n| n.to_lowercase().contains(&wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match_preferred() {
        let ports = names(&["TB-3 MIDI 1", "TB-3"]);
        assert_eq!(match_port_name(&ports, "TB-3"), Some(1));
    }

    #[test]
    fn test_substring_match_case_insensitive() {
        let ports = names(&["Midi Through Port-0", "TD-3 MIDI 1"]);
        assert_eq!(match_port_name(&ports, "td-3"), Some(1));
        assert_eq!(match_port_name(&ports, "volca"), None);
    }

    #[test]
    fn test_first_port_is_default() {
        let infos = describe_ports(names(&["a", "b"]));
        assert!(infos[0].is_default);
        assert!(!infos[1].is_default);
        assert_eq!(infos[1].id, "midi_out_1");
    }
}
