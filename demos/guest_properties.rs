//! 客體屬性示例

use std::sync::Arc;
use vbox_orm::{ForwardedPort, InMemoryDriver, Machine, MachineRef, StoreConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== 客體屬性示例 ===\n");

    // 以記憶體驅動模擬虛擬機管理器
    let driver = Arc::new(InMemoryDriver::new());
    driver.seed_property("/VirtualBox/GuestInfo/OS/Product", "Linux", "TRANSIENT, RDONLYGUEST");
    driver.seed_property("/App/Stage", "provisioning", "");

    let reference = MachineRef::generate("demo-vm");
    let mut machine = Machine::load(reference, driver.clone(), StoreConfig::default())?;
    machine.attach_nat(driver.clone(), 0)?;

    println!("載入的客體屬性:");
    for (key, value) in machine.guest_properties().iter() {
        println!("  - {} = {}", key, value);
    }

    let props = machine.guest_properties_mut();
    props.set("/App/Stage", "ready");
    props.set("/App/Workers", 4);
    // 保留鍵會被忽略
    props.set("/VirtualBox/GuestInfo/OS/Product", "Windows");

    if let Some(ports) = machine.forwarded_ports_mut(0) {
        ports.insert(ForwardedPort::new("ssh", 2222, 22))?;
    }

    let report = machine.save()?;
    println!("\n已寫入: {:?}", report.guest_properties.written);
    println!("驅動呼叫數: {}", driver.write_calls().len());

    Ok(())
}
