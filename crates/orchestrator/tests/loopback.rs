//! Client and installer object wired together over in-memory channels.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dinstaller::transport::MemoryTransport;
use dinstaller::{Connection, Error, InstallerClient, InstallerStatus, Language, OptionValue};
use dinstaller_orchestrator::{
    FakeBackend, InstallerObject, Orchestrator, OrchestratorConfig, PackageBackend, Phase,
    StaticSystemInfo, serve,
};
use dinstaller_protocol::names::error as bus_error;
use dinstaller_protocol::{Disk, LanguageMap, MountAssignment, Product, Variant};
use tokio::time::timeout;

struct Harness {
    client: InstallerClient,
    orchestrator: Arc<Orchestrator>,
    backend: Arc<FakeBackend>,
}

fn system() -> StaticSystemInfo {
    let mut languages = LanguageMap::new();
    languages.insert(
        "cs_CZ".into(),
        vec!["Cestina".into(), "Cestina".into(), ".UTF-8".into(), "".into(), "Checo".into()],
    );
    languages.insert(
        "de_DE".into(),
        vec!["Deutsch".into(), "Deutsch".into(), ".UTF-8".into(), "@euro".into(), "German".into()],
    );
    StaticSystemInfo {
        languages,
        disks: vec![Disk {
            name: "/dev/sda".into(),
            model: "VBOX HARDDISK".into(),
            size: "25.00 GiB".into(),
        }],
        storage: vec![
            MountAssignment {
                mount: "/".into(),
                device: "/dev/sda2".into(),
                fs_type: "btrfs".into(),
                size: "23622320128".into(),
            },
            MountAssignment {
                mount: "swap".into(),
                device: "/dev/sda3".into(),
                fs_type: "swap".into(),
                size: "2147483648".into(),
            },
        ],
    }
}

async fn harness() -> Result<Harness> {
    let products = vec![
        Product::new("Tumbleweed", "openSUSE Tumbleweed"),
        Product::new("Leap", "openSUSE Leap 15.3"),
    ];
    let backend = Arc::new(
        FakeBackend::new(products).with_packages(vec![vec![2, 1]], &["glibc", "bash", "zypper"]),
    );
    let package_backend = Arc::clone(&backend) as Arc<dyn PackageBackend>;
    let orchestrator = Arc::new(Orchestrator::new(package_backend, OrchestratorConfig::default()));
    orchestrator.probe().await?;

    let object = InstallerObject::new(Arc::clone(&orchestrator), Arc::new(system()))
        .with_option("Disk", Variant::new("s", "/dev/sda"));

    let (to_server, server_rx) = tokio::sync::mpsc::unbounded_channel();
    let (to_client, client_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(serve(Arc::new(object), server_rx, to_client));

    let connection = Arc::new(Connection::new(MemoryTransport::connect(to_server, client_rx)));
    connection.start();

    Ok(Harness {
        client: InstallerClient::new(connection),
        orchestrator,
        backend,
    })
}

#[tokio::test]
async fn queries_return_installer_data() -> Result<()> {
    let Harness { client, .. } = harness().await?;

    let products = client.get_products().await?;
    let names: Vec<&str> = products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Tumbleweed", "Leap"]);

    let languages = client.get_languages().await?;
    assert_eq!(
        languages,
        vec![
            Language {
                id: "cs_CZ".into(),
                name: "Cestina".into()
            },
            Language {
                id: "de_DE".into(),
                name: "Deutsch".into()
            },
        ]
    );

    assert_eq!(client.get_disks().await?[0].model, "VBOX HARDDISK");
    let storage = client.get_storage().await?;
    assert_eq!(storage.iter().map(|m| m.mount.as_str()).collect::<Vec<_>>(), vec!["/", "swap"]);
    assert_eq!(client.get_status().await?, InstallerStatus::IDLE);
    Ok(())
}

#[tokio::test]
async fn options_round_trip_through_the_object() -> Result<()> {
    let Harness { client, .. } = harness().await?;

    assert_eq!(client.get_option("Disk").await, Some(OptionValue::String("/dev/sda".into())));

    client.set_option("Disk", "/dev/sdb").await?;
    assert_eq!(client.get_option_as::<String>("Disk").await.as_deref(), Some("/dev/sdb"));

    assert_eq!(client.get_option("Keyboard").await, None);
    let err = client.set_option("Keyboard", "us").await.unwrap_err();
    assert!(matches!(err, Error::Remote { ref name, .. } if name == bus_error::UNKNOWN_PROPERTY));
    Ok(())
}

#[tokio::test]
async fn selecting_unknown_product_is_rejected() -> Result<()> {
    let Harness { client, orchestrator, .. } = harness().await?;

    let err = client.select_product("Fedora").await.unwrap_err();

    assert!(matches!(
        err,
        Error::Remote { ref message, .. } if message == "Unknown product: Fedora"
    ));
    assert_eq!(orchestrator.selected_product(), None);
    Ok(())
}

#[tokio::test]
async fn start_installs_and_signals_status() -> Result<()> {
    let Harness {
        client,
        orchestrator,
        backend,
    } = harness().await?;

    client.select_product("Leap").await?;
    assert_eq!(orchestrator.phase(), Phase::Proposed);

    let mut statuses = client.status().watch();
    client.start_installation().await?;

    timeout(Duration::from_secs(5), async {
        while let Some(status) = statuses.next().await {
            if status == InstallerStatus::INSTALLING {
                break;
            }
        }
        assert_eq!(statuses.next().await, Some(InstallerStatus::IDLE));
    })
    .await?;

    assert_eq!(orchestrator.phase(), Phase::Completed);
    assert_eq!(orchestrator.progress().total_packages, 3);
    assert_eq!(orchestrator.progress().completed, 3);
    assert_eq!(backend.call_count("commit"), 1);
    assert!(!client.get_status().await?.is_installing());
    Ok(())
}

#[tokio::test]
async fn start_without_proposal_fails_remotely() -> Result<()> {
    let Harness { client, backend, .. } = harness().await?;

    let err = client.start_installation().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Remote { ref message, .. } if message == "Cannot install while probed"
    ));
    assert_eq!(backend.call_count("commit"), 0);
    Ok(())
}

#[tokio::test]
async fn only_one_of_two_concurrent_starts_is_accepted() -> Result<()> {
    let Harness {
        client,
        orchestrator,
        backend,
    } = harness().await?;
    client.select_product("Leap").await?;
    let release = backend.gate("commit");

    let (first, second) = tokio::join!(client.start_installation(), client.start_installation());

    let rejected = match (first, second) {
        (Ok(()), Err(err)) | (Err(err), Ok(())) => err,
        other => panic!("expected exactly one accepted start, got {other:?}"),
    };
    assert!(matches!(
        rejected,
        Error::Remote { ref message, .. } if message == "An installation is already in progress"
    ));

    release.send(())?;
    timeout(Duration::from_secs(5), async {
        while orchestrator.is_installing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    assert_eq!(orchestrator.phase(), Phase::Completed);
    assert_eq!(backend.call_count("commit"), 1);
    Ok(())
}
