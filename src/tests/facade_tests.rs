use super::helpers::*;
use crate::config::PmapConfig;
use crate::facade::*;
use crate::types::{IpProtocol, MappingProtocol, PortMappingRequest};
use crate::MappingError;
use std::net::Ipv4Addr;

fn natpmp_mapper(port: u16) -> PortMapper {
    PortMapper::new(
        MappingProtocol::NATPMP,
        PmapConfig {
            natpmp_port: port,
            ..test_config()
        },
    )
}

fn request() -> PortMappingRequest {
    PortMappingRequest::new(6568, IpProtocol::TCP, Ipv4Addr::new(192, 168, 1, 7), LOOPBACK, 7200)
}

#[test]
fn test_mapper_accessors() {
    let mapper = PortMapper::new(MappingProtocol::UPnP, PmapConfig::default());

    assert_eq!(mapper.protocol(), MappingProtocol::UPnP);
    assert_eq!(mapper.config(), &PmapConfig::default());
}

#[test]
fn test_natpmp_add_blocking() {
    let (port, _gateway) = spawn_natpmp_gateway(None, |request| {
        Some(map_response(request[1] + 128, 0, 6568, 40000, 3600))
    });
    let mapper = natpmp_mapper(port);

    let result = mapper.add_port_mapping_blocking(&request());
    let report = mapper.report(&result);

    assert!(report.success);
    assert_eq!(result.unwrap().external_port, 40000);
}

#[test]
fn test_report_of_refusal() {
    let (port, _gateway) = spawn_natpmp_gateway(None, |request| {
        Some(map_response(request[1] + 128, 4, 0, 0, 0))
    });
    let mapper = natpmp_mapper(port);

    let result = mapper.delete_port_mapping_blocking(&request());
    let report = mapper.report(&result);

    assert!(!report.success);
    assert_eq!(report.error_description.as_deref(), Some("Out of resources"));
    assert_eq!(report.error_code, Some(4));
}

#[tokio::test]
async fn test_natpmp_external_ip_async() {
    let (port, _gateway) = spawn_natpmp_gateway(None, |_| {
        Some(external_ip_response(0, Ipv4Addr::new(198, 51, 100, 20)))
    });
    let mapper = natpmp_mapper(port);

    let external_ip = mapper.external_ip(LOOPBACK).await.unwrap();
    assert_eq!(external_ip, Ipv4Addr::new(198, 51, 100, 20));
}

#[tokio::test]
async fn test_natpmp_add_async() {
    let (port, _gateway) = spawn_natpmp_gateway(None, |request| {
        Some(map_response(request[1] + 128, 0, 6568, 6568, 7200))
    });
    let mapper = natpmp_mapper(port);

    let granted = mapper.add_port_mapping(request()).await.unwrap();
    assert_eq!(granted, request());
}

#[tokio::test]
async fn test_upnp_add_returns_request_unchanged() {
    let (http_port, _device) = spawn_http_device(2, |request| {
        if request.starts_with("GET ") {
            (200, IGD_DESCRIPTION.to_string())
        } else {
            (200, String::new())
        }
    });
    let location = format!("http://127.0.0.1:{}/rootDesc.xml", http_port);
    let (ssdp_addr, _ssdp) = spawn_ssdp_responder(vec![ssdp_response(&location, "uuid:igd")]);

    let mapper = PortMapper::new(
        MappingProtocol::UPnP,
        PmapConfig {
            ssdp_addr,
            ..test_config()
        },
    );

    let granted = mapper.add_port_mapping(request()).await.unwrap();
    assert_eq!(granted, request());
}

#[tokio::test]
async fn test_list_devices_async() {
    let (ssdp_addr, _ssdp) = spawn_ssdp_responder(vec![
        ssdp_response("http://127.0.0.1:5000/rootDesc.xml", "uuid:a"),
        ssdp_response("http://127.0.0.1:5001/rootDesc.xml", "uuid:b"),
    ]);
    let mapper = PortMapper::new(
        MappingProtocol::NATPMP,
        PmapConfig {
            ssdp_addr,
            ..test_config()
        },
    );

    let devices = mapper.list_devices(false).await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[1].port, 5001);
}

#[tokio::test]
async fn test_unreachable_gateway_reports_no_response() {
    let silent = std::net::UdpSocket::bind((LOOPBACK, 0)).unwrap();
    let mapper = PortMapper::new(
        MappingProtocol::NATPMP,
        PmapConfig {
            natpmp_port: silent.local_addr().unwrap().port(),
            natpmp_timeout_ms: 50,
            ..test_config()
        },
    );

    let result = mapper.external_ip(LOOPBACK).await;
    let report = mapper.report(&result);

    assert!(matches!(result, Err(MappingError::NoResponse)));
    assert_eq!(report.error_code, Some(crate::types::CODE_NO_RESPONSE));
}

#[test]
fn test_delete_from_synchronous_caller() {
    let (port, gateway) = spawn_natpmp_gateway(None, |request| {
        Some(map_response(request[1] + 128, 0, 6568, 0, 0))
    });
    let mapper = natpmp_mapper(port);

    let deleted = tokio_test::block_on(mapper.delete_port_mapping(request())).unwrap();

    assert_eq!(deleted.lifetime_secs, 0);
    assert_eq!(gateway.join().unwrap()[1], 2, "TCP mapping opcode");
}
