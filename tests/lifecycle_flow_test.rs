// ==========================================
// 质量门控全流程集成测试
// ==========================================
// 测试范围:
// 1. 采购收货: 提交 → 质检 → 批次放行/冻结 → 部分合格关闭
// 2. 生产工单: 齐套检查 → 工序卡 CCP 偏离/复位 → 完工产出批次与质检
// 3. 发货冷链: 温度超限事件、合规标记不可恢复
// 4. 乐观并发: 过期版本的流转返回 StaleState
// ==========================================

mod helpers;

#[cfg(test)]
mod lifecycle_flow_test {
    use crate::helpers::mock_config::{MockConfig, RecordingPublisher};
    use crate::test_helpers::*;
    use chrono::Utc;
    use food_batch_qc::api::{ApiError, LifecycleApi, ReceiveLotRequest};
    use food_batch_qc::app::AppState;
    use food_batch_qc::domain::{
        CcpCriteria, CcpStatus, ColdChainRange, DeliveryLine, DeliveryNote, DeliveryStatus,
        InspectionStatus, JobCard, JobCardStatus, LineQcStatus, LotStatus, PurchaseReceipt,
        QcReading, ReceiptLine, ReceiptQcStatus, ReceiptStatus, TemperatureReading, WorkOrder,
        WorkOrderStatus,
    };
    use food_batch_qc::engine::{
        BlockingReason, DeliveryAction, FefoAllocator, JobCardAction, OptionalEventPublisher,
        QualityEvent, QualityEventPublisher, QualityRepositories, ReceiptAction, WorkOrderAction,
    };
    use food_batch_qc::repository::{AggregateStore, LotLedger};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    struct Harness {
        _temp_file: NamedTempFile,
        state: AppState,
        publisher: Arc<RecordingPublisher>,
    }

    fn setup() -> Harness {
        let (temp_file, db_path) = create_test_db().unwrap();
        let publisher = Arc::new(RecordingPublisher::new());
        let state = AppState::with_publisher(
            db_path,
            Some(publisher.clone() as Arc<dyn QualityEventPublisher>),
        )
        .unwrap();

        for item in [raw_milk(), sugar(), yogurt()] {
            state.repositories.items.upsert_item(&item).unwrap();
        }
        state.quality_api.create_template(&milk_template()).unwrap();
        state.quality_api.create_template(&yogurt_template()).unwrap();

        Harness {
            _temp_file: temp_file,
            state,
            publisher,
        }
    }

    fn expect_refusal(err: ApiError) -> BlockingReason {
        match err {
            ApiError::TransitionRefused(refused) => refused.reason,
            other => panic!("应为流转拒绝: {:?}", other),
        }
    }

    // ==========================================
    // 采购收货
    // ==========================================

    #[test]
    fn test_receipt_partial_acceptance_flow() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;
        let quality = &h.state.quality_api;
        let inventory = &h.state.inventory_api;

        let receipt = PurchaseReceipt::new("RC-1", "SUP-1", Utc::now())
            .with_line(
                ReceiptLine::new(1, "MILK", "WH1", "M-001", 100.0)
                    .with_dates(Some(date(2026, 10, 18)), None),
            )
            .with_line(ReceiptLine::new(2, "MILK", "WH1", "M-002", 50.0))
            .with_line(ReceiptLine::new(3, "SUGAR", "WH1", "S-001", 20.0));
        let created = lifecycle.create_receipt(&receipt).unwrap();
        assert_eq!(created.revision, 1);

        let submitted = lifecycle
            .transition_receipt("RC-1", Some(1), ReceiptAction::Submit)
            .unwrap();
        assert_eq!(submitted.status, ReceiptStatus::PendingQc);
        assert_eq!(submitted.qc_status(), ReceiptQcStatus::Pending);

        // 需检行隔离入账,效期按保质期推算;免检行直接可用
        let lot1 = inventory.get_lot("LOT-RC-1-1").unwrap();
        assert_eq!(lot1.status, LotStatus::Quarantine);
        assert_eq!(lot1.exp_date, Some(date(2026, 10, 28)));
        assert_eq!(inventory.get_lot("LOT-RC-1-3").unwrap().status, LotStatus::Available);

        let inspection = quality.get_inspection("QI-RC-1-1").unwrap();
        assert_eq!(inspection.status, InspectionStatus::Draft);
        assert_eq!(inspection.batch_no, "M-001");
        assert!(quality.get_inspection("QI-RC-1-3").is_err());

        // 质检未出结论不可关闭
        let err = lifecycle
            .transition_receipt("RC-1", None, ReceiptAction::Complete)
            .unwrap_err();
        match expect_refusal(err) {
            BlockingReason::QcPending { lines } => assert_eq!(lines, vec![1, 2]),
            other => panic!("应为 QcPending: {:?}", other),
        }

        // 行 1 合格
        let passed = quality
            .record_readings(
                "QI-RC-1-1",
                Some(1),
                vec![QcReading::numeric("acidity", 15.0), QcReading::acceptance("odor", "NORMAL")],
            )
            .unwrap();
        assert_eq!(passed.status, InspectionStatus::Passed);
        assert_eq!(inventory.get_lot("LOT-RC-1-1").unwrap().status, LotStatus::Available);

        // 行 2 关键参数不合格
        let failed = quality
            .record_readings(
                "QI-RC-1-2",
                None,
                vec![QcReading::numeric("acidity", 20.0), QcReading::acceptance("odor", "NORMAL")],
            )
            .unwrap();
        assert_eq!(failed.status, InspectionStatus::Failed);
        assert_eq!(inventory.get_lot("LOT-RC-1-2").unwrap().status, LotStatus::OnHold);

        let receipt = lifecycle.get_receipt("RC-1").unwrap();
        assert_eq!(receipt.qc_status(), ReceiptQcStatus::Partial);
        let line1 = receipt.line(1).unwrap();
        assert_eq!(line1.qc_status, LineQcStatus::Passed);
        assert!((line1.accepted_qty - 100.0).abs() < 1e-9);
        let line2 = receipt.line(2).unwrap();
        assert_eq!(line2.qc_status, LineQcStatus::Failed);
        assert!((line2.rejected_qty - 50.0).abs() < 1e-9);

        // 部分合格允许关闭
        let completed = lifecycle
            .transition_receipt("RC-1", Some(receipt.revision), ReceiptAction::Complete)
            .unwrap();
        assert_eq!(completed.status, ReceiptStatus::Completed);

        // 已出结论的质检单不可改读数
        let err = quality
            .record_readings("QI-RC-1-2", None, vec![QcReading::numeric("acidity", 15.0)])
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidStateTransition { .. }));

        assert_eq!(h.publisher.count_of("InspectionFinalized"), 2);
    }

    #[test]
    fn test_incomplete_readings_keep_inspection_open() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;
        let receipt = PurchaseReceipt::new("RC-2", "SUP-1", Utc::now())
            .with_line(ReceiptLine::new(1, "MILK", "WH1", "M-010", 30.0));
        lifecycle.create_receipt(&receipt).unwrap();
        lifecycle
            .transition_receipt("RC-2", None, ReceiptAction::Submit)
            .unwrap();

        let partial = h
            .state
            .quality_api
            .record_readings("QI-RC-2-1", None, vec![QcReading::numeric("acidity", 14.0)])
            .unwrap();
        assert_eq!(partial.status, InspectionStatus::InProgress);
        assert_eq!(
            h.state.inventory_api.get_lot("LOT-RC-2-1").unwrap().status,
            LotStatus::Quarantine
        );
        assert_eq!(
            lifecycle.get_receipt("RC-2").unwrap().qc_status(),
            ReceiptQcStatus::Pending
        );
        assert!(h.publisher.events().is_empty());
    }

    #[test]
    fn test_failed_reading_with_pending_parameters_stays_open() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;
        let quality = &h.state.quality_api;
        let inventory = &h.state.inventory_api;
        let receipt = PurchaseReceipt::new("RC-3", "SUP-1", Utc::now())
            .with_line(ReceiptLine::new(1, "MILK", "WH1", "M-020", 40.0));
        lifecycle.create_receipt(&receipt).unwrap();
        lifecycle
            .transition_receipt("RC-3", None, ReceiptAction::Submit)
            .unwrap();

        // 酸度超限,气味尚未检
        let open = quality
            .record_readings("QI-RC-3-1", Some(1), vec![QcReading::numeric("acidity", 20.0)])
            .unwrap();
        assert_eq!(open.status, InspectionStatus::InProgress);
        assert_eq!(open.reading_results.len(), 2);
        assert_eq!(inventory.get_lot("LOT-RC-3-1").unwrap().status, LotStatus::Quarantine);
        let line = lifecycle.get_receipt("RC-3").unwrap().line(1).unwrap().clone();
        assert_eq!(line.qc_status, LineQcStatus::Pending);
        assert_eq!(h.publisher.count_of("InspectionFinalized"), 0);

        // 仍可补录读数
        let done = quality
            .record_readings(
                "QI-RC-3-1",
                Some(open.revision),
                vec![QcReading::numeric("acidity", 20.0), QcReading::acceptance("odor", "NORMAL")],
            )
            .unwrap();
        assert_eq!(done.status, InspectionStatus::Failed);
        assert_eq!(inventory.get_lot("LOT-RC-3-1").unwrap().status, LotStatus::OnHold);
        let line = lifecycle.get_receipt("RC-3").unwrap().line(1).unwrap().clone();
        assert_eq!(line.qc_status, LineQcStatus::Failed);
        assert_eq!(h.publisher.count_of("InspectionFinalized"), 1);
    }

    #[test]
    fn test_duplicate_receipt_line_numbers_rejected() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;
        let receipt = PurchaseReceipt::new("RC-4", "SUP-1", Utc::now())
            .with_line(ReceiptLine::new(1, "MILK", "WH1", "M-030", 10.0))
            .with_line(ReceiptLine::new(1, "MILK", "WH1", "M-031", 20.0));

        let err = lifecycle.create_receipt(&receipt).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        assert!(lifecycle.get_receipt("RC-4").is_err());

        // 绕过创建校验直接落库的单据,提交同样被拒且不留半成品
        h.state.repositories.receipts.insert(&receipt).unwrap();
        let err = lifecycle
            .transition_receipt("RC-4", Some(1), ReceiptAction::Submit)
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        assert_eq!(lifecycle.get_receipt("RC-4").unwrap().status, ReceiptStatus::Draft);
        assert!(h.state.quality_api.get_inspection("QI-RC-4-1").is_err());
        assert!(h.state.repositories.lots.find_lot("LOT-RC-4-1").unwrap().is_none());
    }

    #[test]
    fn test_submit_tolerates_already_landed_lot() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;
        let receipt = PurchaseReceipt::new("RC-5", "SUP-1", Utc::now())
            .with_line(ReceiptLine::new(1, "MILK", "WH1", "M-040", 25.0));
        lifecycle.create_receipt(&receipt).unwrap();

        // 上一次提交已落地批次
        let mut landed = available_lot("LOT-RC-5-1", "MILK", 25.0, None);
        landed.status = LotStatus::Quarantine;
        h.state.repositories.lots.insert_lot(&landed).unwrap();

        let submitted = lifecycle
            .transition_receipt("RC-5", Some(1), ReceiptAction::Submit)
            .unwrap();
        assert_eq!(submitted.status, ReceiptStatus::PendingQc);
        let inspection = h.state.quality_api.get_inspection("QI-RC-5-1").unwrap();
        assert_eq!(inspection.status, InspectionStatus::Draft);
        assert_eq!(
            h.state.inventory_api.get_lot("LOT-RC-5-1").unwrap().status,
            LotStatus::Quarantine
        );
    }

    // ==========================================
    // 生产工单
    // ==========================================

    #[test]
    fn test_work_order_ccp_gate_and_output_inspection() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;
        let inventory = &h.state.inventory_api;
        let as_of = date(2026, 10, 19);

        let lot = inventory
            .receive_lot(ReceiveLotRequest {
                item_id: "MILK".to_string(),
                warehouse_id: "WH1".to_string(),
                lot_number: "M-100".to_string(),
                qty: 100.0,
                mfg_date: None,
                exp_date: Some(date(2026, 10, 25)),
                source_ref: None,
            })
            .unwrap();
        assert_eq!(lot.status, LotStatus::Quarantine);
        inventory.release_lot(&lot.lot_id).unwrap();

        // 物料不足: 1000 杯需 200 L
        lifecycle.create_work_order(&yogurt_work_order("WO-BIG", 1000.0)).unwrap();
        lifecycle
            .transition_work_order("WO-BIG", None, WorkOrderAction::Release, as_of)
            .unwrap();
        match lifecycle
            .transition_work_order("WO-BIG", None, WorkOrderAction::Start, as_of)
            .unwrap_err()
        {
            ApiError::MaterialShortage(shortages) => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].item_id, "MILK");
                assert!((shortages[0].required - 200.0).abs() < 1e-9);
                assert!((shortages[0].available - 100.0).abs() < 1e-9);
            }
            other => panic!("应为物料不足: {:?}", other),
        }
        assert_eq!(
            lifecycle.get_work_order("WO-BIG").unwrap().status,
            WorkOrderStatus::Released
        );

        // 正常工单
        lifecycle.create_work_order(&yogurt_work_order("WO-1", 100.0)).unwrap();
        let err = lifecycle
            .transition_work_order("WO-1", None, WorkOrderAction::Start, as_of)
            .unwrap_err();
        assert!(matches!(expect_refusal(err), BlockingReason::NotPermitted { .. }));
        lifecycle
            .transition_work_order("WO-1", None, WorkOrderAction::Release, as_of)
            .unwrap();
        let started = lifecycle
            .transition_work_order("WO-1", None, WorkOrderAction::Start, as_of)
            .unwrap();
        assert_eq!(started.status, WorkOrderStatus::InProgress);
        // 开工只做齐套检查,不扣减
        assert!((inventory.available_qty("MILK", "WH1", as_of).unwrap() - 100.0).abs() < 1e-9);

        // 工序 20 不能先于工序 10 开工
        let err = lifecycle
            .transition_job_card("WO-1", None, 20, JobCardAction::Start)
            .unwrap_err();
        assert!(matches!(
            expect_refusal(err),
            BlockingReason::PriorStepIncomplete { sequence: 10 }
        ));

        lifecycle
            .transition_job_card("WO-1", None, 10, JobCardAction::Start)
            .unwrap();
        lifecycle
            .transition_job_card("WO-1", None, 10, JobCardAction::Complete { completed_qty: 100.0 })
            .unwrap();
        lifecycle
            .transition_job_card("WO-1", None, 20, JobCardAction::Start)
            .unwrap();

        // 杀菌温度不足 → CCP 偏离
        let deviated = lifecycle
            .transition_job_card(
                "WO-1",
                None,
                20,
                JobCardAction::RecordCcpReading {
                    temperature: Some(65.0),
                    holding_time: Some(15.0),
                },
            )
            .unwrap();
        assert_eq!(deviated.ccp_status(), CcpStatus::Failed);
        assert_eq!(h.publisher.count_of("CcpDeviation"), 1);

        let err = lifecycle
            .transition_job_card("WO-1", None, 20, JobCardAction::Complete { completed_qty: 100.0 })
            .unwrap_err();
        assert!(matches!(expect_refusal(err), BlockingReason::CcpFailed { .. }));
        let err = lifecycle
            .transition_work_order("WO-1", None, WorkOrderAction::Complete, as_of)
            .unwrap_err();
        match expect_refusal(err) {
            BlockingReason::CcpFailed { sequences } => assert_eq!(sequences, vec![20]),
            other => panic!("应为 CcpFailed: {:?}", other),
        }

        // 纠偏复位后重新测量
        lifecycle
            .transition_job_card("WO-1", None, 20, JobCardAction::ResetCcp)
            .unwrap();
        let passed = lifecycle
            .transition_job_card(
                "WO-1",
                None,
                20,
                JobCardAction::RecordCcpReading {
                    temperature: Some(75.0),
                    holding_time: Some(20.0),
                },
            )
            .unwrap();
        let card = passed.job_card(20).unwrap();
        assert_eq!(card.ccp_status, CcpStatus::Passed);
        assert_eq!(card.ccp_readings.len(), 2);

        lifecycle
            .transition_job_card("WO-1", None, 20, JobCardAction::Complete { completed_qty: 100.0 })
            .unwrap();
        lifecycle
            .transition_job_card("WO-1", None, 30, JobCardAction::Start)
            .unwrap();

        // 工序未全部完工
        let err = lifecycle
            .transition_work_order("WO-1", None, WorkOrderAction::Complete, as_of)
            .unwrap_err();
        match expect_refusal(err) {
            BlockingReason::JobCardsIncomplete { sequences } => assert_eq!(sequences, vec![30]),
            other => panic!("应为 JobCardsIncomplete: {:?}", other),
        }

        lifecycle
            .transition_job_card("WO-1", None, 30, JobCardAction::Complete { completed_qty: 98.0 })
            .unwrap();
        let completed = lifecycle
            .transition_work_order("WO-1", None, WorkOrderAction::Complete, as_of)
            .unwrap();
        assert_eq!(completed.status, WorkOrderStatus::Completed);
        assert!(completed
            .job_cards
            .iter()
            .all(|c| c.status == JobCardStatus::Completed));
        assert_eq!(completed.output_lot_id.as_deref(), Some("LOT-WO-1"));

        // 需检成品: 产出批次隔离,生成产出质检单
        let output = inventory.get_lot("LOT-WO-1").unwrap();
        assert_eq!(output.status, LotStatus::Quarantine);
        assert!((output.qty - 98.0).abs() < 1e-9);
        assert_eq!(output.exp_date, Some(date(2026, 11, 9)));

        let quality = &h.state.quality_api;
        let inspection = quality.get_inspection("QI-WO-1").unwrap();
        assert_eq!(inspection.status, InspectionStatus::Draft);
        quality
            .record_readings("QI-WO-1", None, vec![QcReading::numeric("coliform", 3.0)])
            .unwrap();
        assert_eq!(inventory.get_lot("LOT-WO-1").unwrap().status, LotStatus::Available);

        let events = h.publisher.events();
        assert!(events.iter().any(|e| matches!(
            e,
            QualityEvent::InspectionFinalized { inspection_id, status: InspectionStatus::Passed, .. }
                if inspection_id == "QI-WO-1"
        )));
    }

    #[test]
    fn test_inconsistent_ccp_cards_rejected_on_create() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;

        let mut unverified = JobCard::ccp(
            20,
            "巴氏杀菌",
            10.0,
            CcpCriteria {
                min_temp: Some(72.0),
                holding_time: Some(15.0),
            },
        );
        unverified.ccp_status = CcpStatus::NotRequired;
        let order = WorkOrder::new("WO-6", "YOGURT", 10.0, Utc::now()).with_job_card(unverified);
        let err = lifecycle.create_work_order(&order).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let mut plain = JobCard::new(10, "配料", 10.0);
        plain.ccp_status = CcpStatus::Pending;
        let order = WorkOrder::new("WO-7", "YOGURT", 10.0, Utc::now()).with_job_card(plain);
        let err = lifecycle.create_work_order(&order).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        assert!(lifecycle.get_work_order("WO-6").is_err());
        assert!(lifecycle.get_work_order("WO-7").is_err());
    }

    #[test]
    fn test_output_qty_uses_last_sequence_regardless_of_input_order() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;
        let as_of = date(2026, 10, 19);

        let mut order = WorkOrder::new("WO-5", "YOGURT", 10.0, Utc::now());
        order.job_cards = vec![JobCard::new(30, "灌装", 10.0), JobCard::new(10, "配料", 10.0)];
        order.output_warehouse_id = Some("WH-FG".to_string());
        let created = lifecycle.create_work_order(&order).unwrap();
        let sequences: Vec<u32> = created.job_cards.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![10, 30]);

        for action in [WorkOrderAction::Release, WorkOrderAction::Start] {
            lifecycle.transition_work_order("WO-5", None, action, as_of).unwrap();
        }
        for (sequence, qty) in [(10, 3.0), (30, 9.0)] {
            lifecycle
                .transition_job_card("WO-5", None, sequence, JobCardAction::Start)
                .unwrap();
            lifecycle
                .transition_job_card("WO-5", None, sequence, JobCardAction::Complete { completed_qty: qty })
                .unwrap();
        }
        lifecycle
            .transition_work_order("WO-5", None, WorkOrderAction::Complete, as_of)
            .unwrap();

        let output = h.state.inventory_api.get_lot("LOT-WO-5").unwrap();
        assert!((output.qty - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_stale_revision_is_rejected() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;
        let as_of = date(2026, 10, 19);

        let created = lifecycle.create_work_order(&yogurt_work_order("WO-2", 10.0)).unwrap();
        assert_eq!(created.revision, 1);

        let released = lifecycle
            .transition_work_order("WO-2", Some(1), WorkOrderAction::Release, as_of)
            .unwrap();
        assert_eq!(released.revision, 2);

        // 另一调用方仍持有 revision 1
        let err = lifecycle
            .transition_work_order("WO-2", Some(1), WorkOrderAction::Cancel, as_of)
            .unwrap_err();
        match &err {
            ApiError::StaleState { expected, actual, .. } => {
                assert_eq!(*expected, 1);
                assert_eq!(*actual, 2);
            }
            other => panic!("应为 StaleState: {:?}", other),
        }
        assert!(err.is_retryable());
        assert_eq!(
            lifecycle.get_work_order("WO-2").unwrap().status,
            WorkOrderStatus::Released
        );
    }

    // ==========================================
    // 发货冷链
    // ==========================================

    #[test]
    fn test_cold_chain_excursion_is_sticky() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;

        let note = DeliveryNote::new("DN-1", "CUST-1", "CHILLED", Utc::now()).with_line(DeliveryLine {
            item_id: "YOGURT".to_string(),
            lot_id: "LOT-WO-1".to_string(),
            qty: 50.0,
        });
        lifecycle.create_delivery(&note).unwrap();
        lifecycle
            .transition_delivery("DN-1", None, DeliveryAction::Dispatch)
            .unwrap();

        let log = |celsius: f64| {
            lifecycle
                .log_delivery_temperature(
                    "DN-1",
                    None,
                    TemperatureReading {
                        recorded_at: Utc::now(),
                        celsius,
                    },
                )
                .unwrap()
        };

        assert!(log(3.0).cold_chain_compliant);
        assert!(!log(8.0).cold_chain_compliant);
        // 回到区间内也不恢复
        assert!(!log(4.0).cold_chain_compliant);
        let last = log(-1.0);
        assert!(!last.cold_chain_compliant);
        assert_eq!(last.temperature_log.len(), 4);
        assert_eq!(h.publisher.count_of("ColdChainExcursion"), 2);

        let delivered = lifecycle
            .transition_delivery("DN-1", None, DeliveryAction::Deliver)
            .unwrap();
        assert_eq!(delivered.status, DeliveryStatus::Delivered);

        let err = lifecycle
            .log_delivery_temperature(
                "DN-1",
                None,
                TemperatureReading {
                    recorded_at: Utc::now(),
                    celsius: 2.0,
                },
            )
            .unwrap_err();
        assert!(matches!(expect_refusal(err), BlockingReason::DeliveryClosed { .. }));
    }

    #[test]
    fn test_in_memory_wiring_uses_configured_range() {
        // 不经 AppState,直接以内存仓储装配
        let repos = QualityRepositories::in_memory();
        let allocator: Arc<FefoAllocator<dyn LotLedger>> = Arc::new(FefoAllocator::new(repos.lots.clone()));
        let config = MockConfig::default().with_range("CHILLED", ColdChainRange { min_c: 2.0, max_c: 4.0 });
        let publisher = Arc::new(RecordingPublisher::new());
        let lifecycle = LifecycleApi::new(
            repos,
            allocator,
            Arc::new(config),
            OptionalEventPublisher::with_publisher(publisher.clone()),
        );

        lifecycle
            .create_delivery(&DeliveryNote::new("DN-3", "CUST-1", "chilled", Utc::now()))
            .unwrap();
        // 1 ℃ 在内置区间内,但低于覆写后的下限
        let note = lifecycle
            .log_delivery_temperature(
                "DN-3",
                Some(1),
                TemperatureReading {
                    recorded_at: Utc::now(),
                    celsius: 1.0,
                },
            )
            .unwrap();
        assert!(!note.cold_chain_compliant);
        assert_eq!(note.revision, 2);

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            QualityEvent::ColdChainExcursion { delivery_id, range, .. } => {
                assert_eq!(delivery_id, "DN-3");
                assert_eq!(*range, ColdChainRange { min_c: 2.0, max_c: 4.0 });
            }
            other => panic!("应为冷链超限事件: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_category_cannot_log_temperature() {
        let h = setup();
        let lifecycle = &h.state.lifecycle_api;
        lifecycle
            .create_delivery(&DeliveryNote::new("DN-2", "CUST-1", "SPACE", Utc::now()))
            .unwrap();

        let err = lifecycle
            .log_delivery_temperature(
                "DN-2",
                None,
                TemperatureReading {
                    recorded_at: Utc::now(),
                    celsius: 2.0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }
}
