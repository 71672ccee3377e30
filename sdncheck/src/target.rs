//! Managed remote target: the harness-owned handle for one provisioned
//! guest instance.
//!
//! The target hides which access path is active behind one interface and
//! keeps the interface-provisioning bookkeeping. Channel variant selection
//! happens here: the interactive console is attached eagerly when the
//! deployment exposes one, the per-command path lazily once a floating IP
//! is known. Using a capability before the required attach/associate step
//! is a programming error in the test and fails as a precondition, never
//! as a silent false result.

use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sdncheck_common::errors::TransportError;
use sdncheck_common::{HarnessConfig, HarnessError};

use crate::channel::{CommandChannel, InteractiveChannel, IpFamily, PerCommandChannel};
use crate::connectivity::{Expectation, output_matches};
use crate::transport::ssh::SshTransport;
use crate::transport::telnet::ConsoleTransport;
use crate::transport::{Credentials, Endpoint, Transport};

/// Login and image characteristics of a guest image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageProfile {
    pub image_name: String,
    pub username: String,
    pub password: Option<String>,
    /// Shell prompt pattern the image presents after login.
    pub prompt: String,
}

impl ImageProfile {
    /// The default minimal guest.
    pub fn default_guest() -> Self {
        Self {
            image_name: "cirros-0.3.5-x86_64-disk".to_string(),
            username: "cirros".to_string(),
            password: Some("cubswin:)".to_string()),
            prompt: r"\$".to_string(),
        }
    }

    /// Richer guest with a root login, for tests that need a full
    /// userland.
    pub fn advanced_guest() -> Self {
        Self {
            image_name: "alpine".to_string(),
            username: "root".to_string(),
            password: Some("tigris".to_string()),
            prompt: "~#".to_string(),
        }
    }

    pub fn is_cirros(&self) -> bool {
        self.image_name.contains("cirros")
    }

    /// Non-root logins need privilege elevation for system commands.
    pub fn needs_sudo(&self) -> bool {
        self.username != "root"
    }
}

/// Supplies concrete transports for the two access paths. The default
/// wires the console and ssh transports; tests substitute scripted mocks.
pub trait TransportProvider: Send + Sync {
    fn console(&self, profile: &ImageProfile) -> Result<Box<dyn Transport>, TransportError>;
    fn floating_ip(&self) -> Box<dyn Transport>;
}

/// Default provider backed by the real transports.
pub struct SystemTransports;

impl TransportProvider for SystemTransports {
    fn console(&self, profile: &ImageProfile) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(ConsoleTransport::new(&profile.prompt)?))
    }

    fn floating_ip(&self) -> Box<dyn Transport> {
        Box::new(SshTransport)
    }
}

/// Derive the console endpoint from the hypervisor host and the instance
/// name: `instance-0000001f` exposes its console on TCP port 0x1f + 2000.
pub fn console_endpoint(hypervisor_host: &str, instance_name: &str) -> Result<Endpoint, HarnessError> {
    let (_, hex) = instance_name
        .rsplit_once('-')
        .ok_or_else(|| HarnessError::precondition(format!("unexpected instance name '{instance_name}'")))?;
    let ordinal = u32::from_str_radix(hex, 16).map_err(|_| {
        HarnessError::precondition(format!("unexpected instance name '{instance_name}'"))
    })?;
    let port = u16::try_from(2000 + ordinal).map_err(|_| {
        HarnessError::precondition(format!("console port out of range for '{instance_name}'"))
    })?;
    Ok(Endpoint::new(hypervisor_host, port))
}

/// One provisioned guest instance under test.
pub struct RemoteTarget {
    id: String,
    profile: ImageProfile,
    config: Arc<HarnessConfig>,
    transports: Box<dyn TransportProvider>,
    channel: Option<CommandChannel>,
    floating_ip: Option<IpAddr>,
    connectivity_verified: bool,
    nics_configured: u32,
    nics_prepared_for: u32,
}

impl RemoteTarget {
    pub fn new(id: impl Into<String>, profile: ImageProfile, config: Arc<HarnessConfig>) -> Self {
        Self::with_transports(id, profile, config, Box::new(SystemTransports))
    }

    pub fn with_transports(
        id: impl Into<String>,
        profile: ImageProfile,
        config: Arc<HarnessConfig>,
        transports: Box<dyn TransportProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            profile,
            config,
            transports,
            channel: None,
            floating_ip: None,
            connectivity_verified: false,
            nics_configured: 0,
            nics_prepared_for: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn profile(&self) -> &ImageProfile {
        &self.profile
    }

    pub fn floating_ip(&self) -> Option<IpAddr> {
        self.floating_ip
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn has_console_access(&self) -> bool {
        self.channel.as_ref().is_some_and(CommandChannel::is_interactive)
    }

    pub fn has_floating_ip_access(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| !channel.is_interactive())
    }

    /// Attach the interactive console path if the deployment exposes one.
    ///
    /// Returns whether a channel was attached. When console access is
    /// disabled, attachment is deferred until a floating IP is associated;
    /// that association is the only way the per-command path is created.
    pub fn attach_console(
        &mut self,
        hypervisor_host: &str,
        instance_name: &str,
    ) -> Result<bool, HarnessError> {
        if !self.config.access.console_access_enabled {
            debug!("target {}: console access disabled, deferring channel attach", self.id);
            return Ok(false);
        }
        if self.channel.is_some() {
            return Err(HarnessError::precondition(format!(
                "target {} already has a channel attached",
                self.id
            )));
        }
        let endpoint = console_endpoint(hypervisor_host, instance_name)?;
        info!("target {}: attaching interactive console on {endpoint}", self.id);
        let transport = self.transports.console(&self.profile)?;
        let credentials = Credentials {
            username: self.profile.username.clone(),
            secret: self.profile.password.clone(),
            identity_file: None,
        };
        self.channel = Some(CommandChannel::Interactive(InteractiveChannel::new(
            transport,
            endpoint,
            credentials,
            &self.config,
        )));
        Ok(true)
    }

    /// Record the floating IP. The first association also attaches the
    /// per-command access path, unless a console is already attached.
    pub fn associate_floating_ip(&mut self, address: IpAddr) {
        self.floating_ip = Some(address);
        if self.channel.is_none() {
            info!("target {}: attaching per-command access via {address}", self.id);
            let endpoint = Endpoint::host_only(address.to_string());
            let credentials = Credentials {
                username: self.profile.username.clone(),
                secret: self.profile.password.clone(),
                identity_file: self.config.access.identity_file.clone(),
            };
            let transport = self.transports.floating_ip();
            self.channel = Some(CommandChannel::PerCommand(PerCommandChannel::new(
                transport,
                endpoint,
                credentials,
                &self.config,
            )));
        }
    }

    fn channel_mut(&mut self) -> Result<&mut CommandChannel, HarnessError> {
        let id = self.id.clone();
        self.channel.as_mut().ok_or_else(|| {
            HarnessError::precondition(format!("target {id} has no channel attached"))
        })
    }

    /// Run a command on the guest, elevating privileges when the login
    /// user needs it for system commands.
    pub async fn send(&mut self, command: &str) -> Result<String, HarnessError> {
        if self.profile.needs_sudo() {
            self.send_plain(&format!("sudo {command}")).await
        } else {
            self.send_plain(command).await
        }
    }

    /// Run a command exactly as given.
    pub async fn send_plain(&mut self, command: &str) -> Result<String, HarnessError> {
        let timeout = self.config.ssh_timeout();
        let channel = self.channel_mut()?;
        Ok(channel.send(command, timeout).await?)
    }

    /// Probe `destination` and report whether the observed received-packet
    /// count matches the expectation.
    pub async fn ping(
        &mut self,
        destination: &str,
        count: u32,
        interface: Option<&str>,
        family: IpFamily,
        expected: Expectation,
    ) -> Result<bool, HarnessError> {
        let channel = self.channel_mut()?;
        let raw = channel.ping(destination, count, interface, family).await?;
        Ok(output_matches(&raw, count, expected))
    }

    /// Verify the guest answers on its channel. The verdict is cached;
    /// `force_recheck` re-probes.
    pub async fn check_connectivity(&mut self, force_recheck: bool) -> Result<(), HarnessError> {
        if self.connectivity_verified && !force_recheck {
            return Ok(());
        }
        self.send_plain("hostname").await?;
        self.connectivity_verified = true;
        Ok(())
    }

    pub fn connectivity_verified(&self) -> bool {
        self.connectivity_verified
    }

    /// Assign an additional address family to an interface: address, link
    /// up, default route, then state dumps for the test log.
    pub async fn configure_dualstack_interface(
        &mut self,
        address: IpAddr,
        network: &IpNetwork,
        gateway: IpAddr,
        device: &str,
    ) -> Result<(), HarnessError> {
        info!(
            "target {}: configuring {address}/{} on {device} via {gateway}",
            self.id,
            network.prefix()
        );
        self.send(&format!("ip -6 addr add {address}/{} dev {device}", network.prefix()))
            .await?;
        self.send(&format!("ip link set dev {device} up")).await?;
        self.send(&format!("ip -6 route add default via {gateway}")).await?;
        self.send("ip a").await?;
        self.send("route -n -A inet6").await?;
        Ok(())
    }

    /// Create a VLAN sub-interface. Guest images without the 8021q module
    /// cannot; `check_image` probes for it first.
    pub async fn configure_vlan_interface(
        &mut self,
        address: IpAddr,
        interface: &str,
        vlan: u16,
        check_image: bool,
    ) -> Result<(), HarnessError> {
        if check_image {
            let probe = self.send("lsmod | { grep 8021q || true; }").await?;
            if probe.trim().is_empty() {
                return Err(HarnessError::precondition(format!(
                    "8021q not loaded on guest image {}",
                    self.profile.image_name
                )));
            }
        }
        self.send(&format!(
            "ip link add link {interface} name {interface}.{vlan} type vlan id {vlan}"
        ))
        .await?;
        self.send(&format!("ifconfig {interface}.{vlan} {address} up")).await?;
        self.send("ifconfig").await?;
        Ok(())
    }

    pub async fn configure_ip_forwarding(&mut self) -> Result<(), HarnessError> {
        self.send("sysctl -w net.ipv4.ip_forward=1").await?;
        Ok(())
    }

    pub async fn bring_down_interface(&mut self, interface: &str) -> Result<(), HarnessError> {
        self.send(&format!("ifconfig {interface} 0.0.0.0")).await?;
        self.send("ifconfig").await?;
        Ok(())
    }

    /// Mount the config drive on /mnt.
    pub async fn mount_config_drive(&mut self) -> Result<(), HarnessError> {
        let blkid = self.send("blkid | grep -i config-2").await?;
        let device = blkid
            .split(':')
            .next()
            .map(str::trim)
            .filter(|device| !device.is_empty())
            .map(str::to_string)
            .ok_or_else(|| HarnessError::precondition("no config drive present"))?;
        self.send(&format!("mount {device} /mnt")).await?;
        Ok(())
    }

    pub async fn unmount_config_drive(&mut self) -> Result<(), HarnessError> {
        self.send("umount /mnt").await?;
        Ok(())
    }

    /// Record that one more NIC has been configured on the guest.
    pub fn note_nic_configured(&mut self) {
        self.nics_configured += 1;
    }

    pub fn nics_configured(&self) -> u32 {
        self.nics_configured
    }

    /// Bring up NICs configured since the last call. NIC 0 comes up with
    /// the image, and only minimal guests need the extra-NIC dance.
    /// Re-invoking with no newly configured NICs performs no remote work.
    pub async fn prepare_nics(&mut self) -> Result<(), HarnessError> {
        if !self.profile.is_cirros() {
            // Richer images pick up extra NICs on their own.
            self.nics_prepared_for = self.nics_configured;
            return Ok(());
        }
        while self.nics_prepared_for < self.nics_configured {
            let next = self.nics_prepared_for;
            if next > 0 {
                self.prepare_extra_nic(&format!("eth{next}")).await?;
            }
            self.nics_prepared_for += 1;
        }
        Ok(())
    }

    async fn prepare_extra_nic(&mut self, nic: &str) -> Result<(), HarnessError> {
        self.send_plain(&format!(
            "echo \"auto {nic}\" | sudo tee -a /etc/network/interfaces; \
             echo \"iface {nic} inet dhcp\" | sudo tee -a /etc/network/interfaces; \
             sudo /sbin/cirros-dhcpc up {nic}"
        ))
        .await?;
        Ok(())
    }

    /// Release the channel's transport resources. Idempotent; fixture
    /// teardown calls this regardless of the test verdict.
    pub async fn close(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            channel.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::transport::mock::{MockTransport, MockTransportProvider};

    fn config(console: bool) -> Arc<HarnessConfig> {
        let mut config = HarnessConfig::default();
        config.access.console_access_enabled = console;
        Arc::new(config)
    }

    fn target(console: bool, transport: &MockTransport) -> RemoteTarget {
        RemoteTarget::with_transports(
            "vm-1",
            ImageProfile::default_guest(),
            config(console),
            Box::new(MockTransportProvider::new(transport.clone())),
        )
    }

    fn fip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(172, 20, 0, 15))
    }

    #[test]
    fn console_endpoint_parses_the_hex_instance_suffix() {
        let endpoint = console_endpoint("compute-3", "instance-0000001f").unwrap();
        assert_eq!(endpoint, Endpoint::new("compute-3", 2031));

        assert!(console_endpoint("compute-3", "nonsense").is_err());
        assert!(console_endpoint("compute-3", "instance-zz").is_err());
    }

    #[tokio::test]
    async fn capabilities_before_attach_are_precondition_errors() {
        let transport = MockTransport::builder().build();
        let mut target = target(false, &transport);

        let err = target
            .ping("10.0.0.4", 3, None, IpFamily::V4, Expectation::Reachable)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Precondition(_)));

        let err = target.send("ip a").await.unwrap_err();
        assert!(matches!(err, HarnessError::Precondition(_)));
        assert_eq!(transport.exec_count(), 0);
    }

    #[tokio::test]
    async fn console_attach_is_deferred_when_disabled() {
        let transport = MockTransport::builder().build();
        let mut target = target(false, &transport);

        let attached = target.attach_console("compute-3", "instance-0000001f").unwrap();
        assert!(!attached);
        assert!(!target.has_channel());

        target.associate_floating_ip(fip());
        assert!(target.has_floating_ip_access());
        assert!(!target.has_console_access());
    }

    #[tokio::test]
    async fn console_attach_wins_over_a_later_floating_ip() {
        let transport = MockTransport::builder().build();
        let mut target = target(true, &transport);

        assert!(target.attach_console("compute-3", "instance-0000001f").unwrap());
        assert!(target.has_console_access());

        target.associate_floating_ip(fip());
        assert!(target.has_console_access());
        assert!(!target.has_floating_ip_access());
        assert_eq!(target.floating_ip(), Some(fip()));
    }

    #[tokio::test]
    async fn send_elevates_for_non_root_logins_only() {
        let transport = MockTransport::builder().build();
        let mut target = target(false, &transport);
        target.associate_floating_ip(fip());

        target.send("ip a").await.unwrap();
        target.send_plain("cat /etc/hostname").await.unwrap();
        assert_eq!(transport.commands(), vec!["sudo ip a", "cat /etc/hostname"]);

        let transport = MockTransport::builder().build();
        let mut root_target = RemoteTarget::with_transports(
            "vm-2",
            ImageProfile::advanced_guest(),
            config(false),
            Box::new(MockTransportProvider::new(transport.clone())),
        );
        root_target.associate_floating_ip(fip());
        root_target.send("ip a").await.unwrap();
        assert_eq!(transport.commands(), vec!["ip a"]);
    }

    #[tokio::test]
    async fn prepare_nics_only_touches_new_nics() {
        let transport = MockTransport::builder().build();
        let mut target = target(false, &transport);
        target.associate_floating_ip(fip());

        // NIC 0 never needs preparation.
        target.note_nic_configured();
        target.prepare_nics().await.unwrap();
        assert_eq!(transport.exec_count(), 0);

        target.note_nic_configured();
        target.prepare_nics().await.unwrap();
        assert_eq!(transport.exec_count(), 1);
        assert!(transport.commands()[0].contains("cirros-dhcpc up eth1"));

        // No new NICs: re-invocation performs zero remote commands.
        target.prepare_nics().await.unwrap();
        assert_eq!(transport.exec_count(), 1);

        target.note_nic_configured();
        target.prepare_nics().await.unwrap();
        assert_eq!(transport.exec_count(), 2);
        assert!(transport.commands()[1].contains("cirros-dhcpc up eth2"));
    }

    #[tokio::test]
    async fn dualstack_configuration_sends_the_exact_sequence() {
        let transport = MockTransport::builder().build();
        let mut target = target(false, &transport);
        target.associate_floating_ip(fip());

        let network: IpNetwork = "cafe:babe::/64".parse().unwrap();
        target
            .configure_dualstack_interface(
                "cafe:babe::4".parse().unwrap(),
                &network,
                "cafe:babe::1".parse().unwrap(),
                "eth0",
            )
            .await
            .unwrap();

        assert_eq!(
            transport.commands(),
            vec![
                "sudo ip -6 addr add cafe:babe::4/64 dev eth0",
                "sudo ip link set dev eth0 up",
                "sudo ip -6 route add default via cafe:babe::1",
                "sudo ip a",
                "sudo route -n -A inet6",
            ]
        );
    }

    #[tokio::test]
    async fn vlan_configuration_requires_the_8021q_module() {
        let transport = MockTransport::builder().respond("lsmod", "").build();
        let mut target_no_module = target(false, &transport);
        target_no_module.associate_floating_ip(fip());

        let err = target_no_module
            .configure_vlan_interface("10.0.0.4".parse().unwrap(), "eth0", 100, true)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Precondition(_)));

        let transport = MockTransport::builder().respond("lsmod", "8021q 12345 0").build();
        let mut target = target(false, &transport);
        target.associate_floating_ip(fip());
        target
            .configure_vlan_interface("10.0.0.4".parse().unwrap(), "eth0", 100, true)
            .await
            .unwrap();
        let commands = transport.commands();
        assert!(commands[1].contains("type vlan id 100"));
        assert!(commands[2].contains("ifconfig eth0.100 10.0.0.4 up"));
    }

    #[tokio::test]
    async fn config_drive_mount_parses_the_device() {
        let transport = MockTransport::builder()
            .respond("blkid", "/dev/sr0: LABEL=\"config-2\" TYPE=\"iso9660\"")
            .build();
        let mut target = target(false, &transport);
        target.associate_floating_ip(fip());

        target.mount_config_drive().await.unwrap();
        assert!(transport.commands()[1].contains("mount /dev/sr0 /mnt"));

        target.unmount_config_drive().await.unwrap();
        assert!(transport.commands()[2].contains("umount /mnt"));
    }

    #[tokio::test]
    async fn connectivity_check_is_cached_until_forced() {
        let transport = MockTransport::builder().respond("hostname", "vm-1").build();
        let mut target = target(false, &transport);
        target.associate_floating_ip(fip());

        assert!(!target.connectivity_verified());
        target.check_connectivity(false).await.unwrap();
        assert!(target.connectivity_verified());
        assert_eq!(transport.exec_count(), 1);

        target.check_connectivity(false).await.unwrap();
        assert_eq!(transport.exec_count(), 1);

        target.check_connectivity(true).await.unwrap();
        assert_eq!(transport.exec_count(), 2);
    }

    #[tokio::test]
    async fn close_is_unconditional_and_idempotent() {
        let transport = MockTransport::builder().build();
        let mut target = target(false, &transport);

        // Closing a target that never attached a channel is a no-op.
        target.close().await;

        target.associate_floating_ip(fip());
        target.close().await;
        target.close().await;
    }
}
