use crate::models::PortDescriptor;

/// Source of the serial devices currently attached to the host
#[cfg_attr(test, mockall::automock)]
pub trait PortRegistry: Send + Sync {
    /// Query the OS for attached devices. Never cached; an empty list is valid.
    fn list_ports(&self) -> Vec<PortDescriptor>;
}

/// The host's serial ports, via the `serialport` crate.
///
/// Also opens ports, see [`PortOpener`](crate::services::link::PortOpener).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortRegistry for SystemPorts {
    fn list_ports(&self) -> Vec<PortDescriptor> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                tracing::warn!("Failed to enumerate serial ports: {}", e);
                return Vec::new();
            }
        };

        let descriptors: Vec<PortDescriptor> = ports
            .into_iter()
            .map(|p| p.port_name)
            .filter(|name| is_listed(name))
            .map(PortDescriptor::new)
            .collect();

        tracing::debug!("Enumerated {} serial ports", descriptors.len());
        descriptors
    }
}

/// On macOS every device shows up twice; only the /dev/cu.* callout side is
/// usable for outgoing connections without waiting on carrier detect.
fn is_listed(name: &str) -> bool {
    #[cfg(target_os = "macos")]
    {
        !name.starts_with("/dev/tty.")
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = name;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    #[test]
    fn test_registry_is_requeried_every_call() {
        let mut registry = MockPortRegistry::new();
        let mut seq = Sequence::new();

        registry
            .expect_list_ports()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| vec![PortDescriptor::new("COM1")]);
        registry
            .expect_list_ports()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| vec![PortDescriptor::new("COM1"), PortDescriptor::new("COM7")]);
        registry
            .expect_list_ports()
            .times(1)
            .in_sequence(&mut seq)
            .returning(Vec::new);

        assert_eq!(registry.list_ports().len(), 1);
        assert_eq!(
            registry.list_ports(),
            vec![PortDescriptor::new("COM1"), PortDescriptor::new("COM7")]
        );
        assert!(registry.list_ports().is_empty());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_all_names_listed_off_macos() {
        assert!(is_listed("/dev/ttyUSB0"));
        assert!(is_listed("COM3"));
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_tty_duplicates_hidden_on_macos() {
        assert!(!is_listed("/dev/tty.usbserial-1410"));
        assert!(is_listed("/dev/cu.usbserial-1410"));
    }
}
