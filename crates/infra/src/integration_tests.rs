//! Integration tests for the full intake pipeline.
//!
//! Tests: Submission -> Services -> EventStore -> Projections -> Views
//!
//! Verifies:
//! - Intake registers documents, stages stock and opens quarantine records
//! - Identity resolution converges concurrent submissions on one row
//! - Quality decisions gate correctly and post the right movements
//! - Requests are validated against live stock and dispatch atomically
//! - Read models rebuilt from the event log match the live ones

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use acopio_core::{AggregateId, DomainError, TenantId};
    use acopio_events::InMemoryEventBus;
    use acopio_extraction::{
        ExtractedInvoice, ExtractedLine, InMemoryDocumentStore, ScriptedExtractor,
    };
    use acopio_materials::{CreateMaterial, Material, MaterialCommand, MaterialId, MovementKind};
    use acopio_procurement::LineQualityStatus;
    use acopio_quality::{DecisionKind, QuarantineStatus};
    use acopio_requests::{ProjectId, RequestStatus, RequestType};

    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::event_store::InMemoryEventStore;
    use crate::services::{
        Dispatcher, DocumentSubmission, IdentityResolver, IntakeReceipt, IntakeService,
        MovementRequest, ProjectionSet, QualityDecision, QualityService, RequestLineSubmission,
        RequestService, RequestSubmission, SharedBus, SharedStore, StockService, SubmissionLine,
        SubmitOutcome,
    };
    use crate::settings::Settings;

    struct Pipeline {
        store: SharedStore,
        projections: Arc<ProjectionSet>,
        identity: Arc<IdentityResolver>,
        intake: Arc<IntakeService>,
        quality: Arc<QualityService>,
        stock: Arc<StockService>,
        requests: Arc<RequestService>,
        scans: Arc<InMemoryDocumentStore>,
        extractor: Arc<ScriptedExtractor>,
        dispatcher: Arc<Dispatcher>,
        settings: Settings,
    }

    fn pipeline() -> Pipeline {
        let settings = Settings::default();
        let store: SharedStore = Arc::new(InMemoryEventStore::new());
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus));
        let projections = Arc::new(ProjectionSet::in_memory(settings.movement_codes));
        let identity = Arc::new(IdentityResolver::new(
            dispatcher.clone(),
            projections.clone(),
            store.clone(),
        ));
        let scans = Arc::new(InMemoryDocumentStore::new());
        let extractor = Arc::new(ScriptedExtractor::new());
        let intake = Arc::new(IntakeService::new(
            dispatcher.clone(),
            projections.clone(),
            identity.clone(),
            settings.clone(),
            scans.clone(),
            extractor.clone(),
        ));
        let quality = Arc::new(QualityService::new(
            dispatcher.clone(),
            projections.clone(),
            settings.clone(),
        ));
        let stock = Arc::new(StockService::new(dispatcher.clone(), projections.clone()));
        let requests = Arc::new(RequestService::new(
            dispatcher.clone(),
            projections.clone(),
            settings.clone(),
        ));

        Pipeline {
            store,
            projections,
            identity,
            intake,
            quality,
            stock,
            requests,
            scans,
            extractor,
            dispatcher,
            settings,
        }
    }

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn cement_line(quantity: i64, unit_price: i64) -> SubmissionLine {
        SubmissionLine {
            raw_text: "Cemento Gris Tipo I".to_string(),
            quantity_invoiced: quantity,
            quantity_received: None,
            unit_price,
            quality_status: LineQualityStatus::Conforme,
            remarks: None,
        }
    }

    fn acme_submission(invoice_number: &str, lines: Vec<SubmissionLine>) -> DocumentSubmission {
        DocumentSubmission {
            provider_name: "ACME, C.A.".to_string(),
            provider_tax_id: "J-12345678-9".to_string(),
            invoice_number: invoice_number.to_string(),
            issue_date: None,
            received_at: None,
            purchase_order_ref: None,
            delivery_note_ref: None,
            vehicle_plate: None,
            support_document_ref: None,
            extracted_total: None,
            lines,
        }
    }

    fn registered(outcome: SubmitOutcome) -> IntakeReceipt {
        match outcome {
            SubmitOutcome::Registered(receipt) => receipt,
            SubmitOutcome::Duplicate { .. } => panic!("expected a registered document"),
        }
    }

    fn good_release(aisle: &str, shelf: &str, level: &str) -> QualityDecision {
        QualityDecision {
            kind: DecisionKind::Good,
            aisle: Some(aisle.to_string()),
            shelf: Some(shelf.to_string()),
            level: Some(level.to_string()),
            remarks: None,
            certificate_ref: None,
        }
    }

    #[test]
    fn intake_registers_document_stages_stock_and_opens_quarantine() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        let receipt = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(50, 600)]),
                    false,
                )
                .unwrap(),
        );

        // 50 x 600 cents net, 16% tax on top.
        assert_eq!(receipt.total_net, 30_000);
        assert_eq!(receipt.total_amount, 34_800);
        assert_eq!(receipt.lines.len(), 1);
        assert!(receipt.provider.was_created());
        assert!(receipt.lines[0].material.resolution.was_created());

        let document = p
            .projections
            .documents
            .get(tenant_id, &receipt.document_id)
            .unwrap();
        assert_eq!(document.invoice_number, "F-001");
        assert_eq!(document.lines.len(), 1);
        assert_eq!(document.total_amount, 34_800);

        // Received goods are staged, not available.
        let material_id = receipt.lines[0].material.material_id();
        let material = p.projections.materials.get(tenant_id, &material_id).unwrap();
        assert_eq!(material.name, "CEMENTO GRIS TIPO I");
        assert_eq!(material.available_stock, 0);
        assert_eq!(material.in_quarantine, 50);

        let record = p
            .projections
            .quarantine
            .get(tenant_id, &receipt.lines[0].quarantine_id)
            .unwrap();
        assert_eq!(record.status, QuarantineStatus::Pending);
        assert_eq!(record.physical_count, 50);
        assert_eq!(record.unit_cost, Some(600));
        assert_eq!(record.document_id, receipt.document_id);
    }

    #[test]
    fn concurrent_intakes_for_the_same_provider_converge_on_one_row() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        let intake_a = p.intake.clone();
        let intake_b = p.intake.clone();
        let handle_a = std::thread::spawn(move || {
            registered(
                intake_a
                    .submit_purchase(
                        tenant_id,
                        acme_submission("F-100", vec![cement_line(10, 600)]),
                        false,
                    )
                    .unwrap(),
            )
        });
        let handle_b = std::thread::spawn(move || {
            registered(
                intake_b
                    .submit_purchase(
                        tenant_id,
                        acme_submission("F-200", vec![cement_line(20, 600)]),
                        false,
                    )
                    .unwrap(),
            )
        });

        let receipt_a = handle_a.join().unwrap();
        let receipt_b = handle_b.join().unwrap();

        assert_eq!(receipt_a.provider.id(), receipt_b.provider.id());
        assert_eq!(p.projections.providers.list(tenant_id).len(), 1);
        // Exactly one of the two created the row.
        assert!(receipt_a.provider.was_created() ^ receipt_b.provider.was_created());
    }

    #[test]
    fn material_resolution_learns_and_is_overridable() {
        let p = pipeline();
        let tenant_id = test_tenant_id();
        let now = chrono::Utc::now();

        let first = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(10, 600)]),
                    false,
                )
                .unwrap(),
        );
        let learned_id = first.lines[0].material.material_id();
        assert!(!first.lines[0].material.from_mapping);

        // Same text, sloppier casing: answered by the learned mapping.
        let resolved = p
            .identity
            .resolve_material(tenant_id, "cemento gris tipo i", now)
            .unwrap();
        assert!(resolved.from_mapping);
        assert!(!resolved.resolution.was_created());
        assert_eq!(resolved.material_id(), learned_id);

        // Reviewer points the text at a manually created catalog entry.
        let replacement_id = MaterialId::new(AggregateId::new());
        let committed = p
            .dispatcher
            .dispatch::<Material>(
                tenant_id,
                replacement_id.0,
                "materials.material",
                MaterialCommand::CreateMaterial(CreateMaterial {
                    tenant_id,
                    material_id: replacement_id,
                    name: "CEMENTO PORTLAND GRIS".to_string(),
                    unit: "SACK".to_string(),
                    category: "CEMENT".to_string(),
                    requires_certificate: false,
                    occurred_at: now,
                }),
                |_, id| Material::empty(MaterialId::new(id)),
            )
            .unwrap();
        p.projections.apply_committed(&committed);

        p.identity
            .override_mapping(tenant_id, "Cemento Gris Tipo I", replacement_id, now)
            .unwrap();

        let after = p
            .identity
            .resolve_material(tenant_id, "CEMENTO GRIS TIPO I", now)
            .unwrap();
        assert!(after.from_mapping);
        assert_eq!(after.material_id(), replacement_id);

        // Overriding to an unknown material is refused.
        let missing = MaterialId::new(AggregateId::new());
        let err = p
            .identity
            .override_mapping(tenant_id, "arena lavada", missing, now)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::NotFound)));
    }

    #[test]
    fn good_release_posts_purchase_in_with_location_and_cost() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        let receipt = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(50, 600)]),
                    false,
                )
                .unwrap(),
        );
        let material_id = receipt.lines[0].material.material_id();
        let quarantine_id = receipt.lines[0].quarantine_id;

        let record = p
            .quality
            .decide(tenant_id, quarantine_id, good_release("2", "B", "1"))
            .unwrap();
        assert_eq!(record.status, QuarantineStatus::ReleasedGood);
        assert_eq!(
            record.location_label.as_deref(),
            Some("AISLE 2 | SHELF B | LEVEL 1")
        );

        let material = p.projections.materials.get(tenant_id, &material_id).unwrap();
        assert_eq!(material.available_stock, 50);
        assert_eq!(material.in_quarantine, 0);
        assert_eq!(material.average_unit_cost, Some(600));
        assert_eq!(
            material.placement.as_deref(),
            Some("AISLE 2 | SHELF B | LEVEL 1")
        );

        let kardex = p.projections.kardex.list_for_material(tenant_id, material_id);
        assert_eq!(kardex.len(), 1);
        assert_eq!(kardex[0].kind, MovementKind::PurchaseIn);
        assert_eq!(kardex[0].code, Some(101));
        assert_eq!(kardex[0].quantity_delta, 50);
        assert_eq!(kardex[0].balance_after, 50);
        assert_eq!(
            kardex[0].reference.as_deref(),
            Some(quarantine_id.to_string().as_str())
        );
    }

    #[test]
    fn certificate_gate_blocks_release_until_reference_is_supplied() {
        let p = pipeline();
        let tenant_id = test_tenant_id();
        let now = chrono::Utc::now();

        // Catalog a gated material first; intake resolves it by name.
        let gated_id = MaterialId::new(AggregateId::new());
        let committed = p
            .dispatcher
            .dispatch::<Material>(
                tenant_id,
                gated_id.0,
                "materials.material",
                MaterialCommand::CreateMaterial(CreateMaterial {
                    tenant_id,
                    material_id: gated_id,
                    name: "ACERO CORRUGADO 12MM".to_string(),
                    unit: "BAR".to_string(),
                    category: "STEEL".to_string(),
                    requires_certificate: true,
                    occurred_at: now,
                }),
                |_, id| Material::empty(MaterialId::new(id)),
            )
            .unwrap();
        p.projections.apply_committed(&committed);

        let mut line = cement_line(30, 2_500);
        line.raw_text = "Acero Corrugado 12mm".to_string();
        let receipt = registered(
            p.intake
                .submit_purchase(tenant_id, acme_submission("F-002", vec![line]), false)
                .unwrap(),
        );
        assert_eq!(receipt.lines[0].material.material_id(), gated_id);
        let quarantine_id = receipt.lines[0].quarantine_id;

        let err = p
            .quality
            .decide(tenant_id, quarantine_id, good_release("1", "A", "3"))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::MissingCertificate)
        ));

        // Nothing moved: still pending, stock untouched.
        let record = p.projections.quarantine.get(tenant_id, &quarantine_id).unwrap();
        assert_eq!(record.status, QuarantineStatus::Pending);
        let material = p.projections.materials.get(tenant_id, &gated_id).unwrap();
        assert_eq!(material.available_stock, 0);
        assert_eq!(material.in_quarantine, 30);

        let mut release = good_release("1", "A", "3");
        release.certificate_ref = Some("CERT-778".to_string());
        let record = p.quality.decide(tenant_id, quarantine_id, release).unwrap();
        assert_eq!(record.status, QuarantineStatus::ReleasedGood);
        assert_eq!(record.certificate_ref.as_deref(), Some("CERT-778"));
    }

    #[test]
    fn second_decision_is_already_resolved() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        let receipt = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(50, 600)]),
                    false,
                )
                .unwrap(),
        );
        let quarantine_id = receipt.lines[0].quarantine_id;

        p.quality
            .decide(tenant_id, quarantine_id, good_release("2", "B", "1"))
            .unwrap();
        let err = p
            .quality
            .decide(tenant_id, quarantine_id, good_release("2", "B", "1"))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::AlreadyResolved)
        ));

        // Stock was not double-released.
        let material_id = receipt.lines[0].material.material_id();
        let material = p.projections.materials.get(tenant_id, &material_id).unwrap();
        assert_eq!(material.available_stock, 50);
    }

    #[test]
    fn rejection_returns_goods_and_clears_the_staged_count() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        let receipt = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(50, 600)]),
                    false,
                )
                .unwrap(),
        );
        let material_id = receipt.lines[0].material.material_id();
        let quarantine_id = receipt.lines[0].quarantine_id;

        // Rejection without remarks is refused.
        let bare = QualityDecision {
            kind: DecisionKind::Rejected,
            aisle: None,
            shelf: None,
            level: None,
            remarks: None,
            certificate_ref: None,
        };
        let err = p
            .quality
            .decide(tenant_id, quarantine_id, bare.clone())
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::MissingRemarks)
        ));

        let mut rejection = bare;
        rejection.remarks = Some("half the sacks arrived wet".to_string());
        let record = p.quality.decide(tenant_id, quarantine_id, rejection).unwrap();
        assert_eq!(record.status, QuarantineStatus::Returned);
        assert_eq!(record.remarks.as_deref(), Some("half the sacks arrived wet"));

        // Staged count is gone; nothing ever reached the available balance.
        let material = p.projections.materials.get(tenant_id, &material_id).unwrap();
        assert_eq!(material.available_stock, 0);
        assert_eq!(material.in_quarantine, 0);

        let kardex = p.projections.kardex.list_for_material(tenant_id, material_id);
        assert_eq!(kardex.len(), 1);
        assert_eq!(kardex[0].kind, MovementKind::Return);
        assert_eq!(kardex[0].code, None);
        assert_eq!(kardex[0].quantity_delta, 0);
        assert_eq!(kardex[0].balance_after, 0);
    }

    #[test]
    fn duplicate_invoice_is_parked_until_confirmed() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        let first = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(50, 600)]),
                    false,
                )
                .unwrap(),
        );

        // Same provider, same invoice number modulo case: parked.
        let outcome = p
            .intake
            .submit_purchase(
                tenant_id,
                acme_submission("f-001 ", vec![cement_line(50, 600)]),
                false,
            )
            .unwrap();
        let SubmitOutcome::Duplicate {
            pending_id,
            existing_document_id,
        } = outcome
        else {
            panic!("expected the duplicate gate to trip");
        };
        assert_eq!(existing_document_id, first.document_id);
        assert_eq!(p.projections.documents.list(tenant_id).len(), 1);

        let confirmed = p.intake.confirm_duplicate(tenant_id, pending_id).unwrap();
        assert_eq!(confirmed.document_id, pending_id);
        assert_eq!(p.projections.documents.list(tenant_id).len(), 2);

        // A confirmed draft is consumed.
        let err = p.intake.confirm_duplicate(tenant_id, pending_id).unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::NotFound)));

        // Acknowledging up front skips the gate entirely.
        let acknowledged = p
            .intake
            .submit_purchase(
                tenant_id,
                acme_submission("F-001", vec![cement_line(10, 600)]),
                true,
            )
            .unwrap();
        assert!(matches!(acknowledged, SubmitOutcome::Registered(_)));
        assert_eq!(p.projections.documents.list(tenant_id).len(), 3);
    }

    #[test]
    fn discarded_pending_draft_registers_nothing() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(50, 600)]),
                    false,
                )
                .unwrap(),
        );
        let outcome = p
            .intake
            .submit_purchase(
                tenant_id,
                acme_submission("F-001", vec![cement_line(50, 600)]),
                false,
            )
            .unwrap();
        let SubmitOutcome::Duplicate { pending_id, .. } = outcome else {
            panic!("expected the duplicate gate to trip");
        };

        assert!(p.intake.discard_pending(tenant_id, pending_id));
        assert!(!p.intake.discard_pending(tenant_id, pending_id));
        assert_eq!(p.projections.documents.list(tenant_id).len(), 1);
    }

    #[test]
    fn request_over_available_stock_reports_every_failing_line() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        // 5 units on hand after release.
        let receipt = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(5, 600)]),
                    false,
                )
                .unwrap(),
        );
        let material_id = receipt.lines[0].material.material_id();
        p.quality
            .decide(
                tenant_id,
                receipt.lines[0].quarantine_id,
                good_release("2", "B", "1"),
            )
            .unwrap();

        let unknown = MaterialId::new(AggregateId::new());
        let err = p
            .requests
            .file_request(
                tenant_id,
                RequestSubmission {
                    project_id: ProjectId::new(AggregateId::new()),
                    budget_item_id: None,
                    requester: "J. Herrera".to_string(),
                    request_type: RequestType::Epp,
                    lines: vec![
                        RequestLineSubmission {
                            material_id,
                            quantity: 10,
                        },
                        RequestLineSubmission {
                            material_id: unknown,
                            quantity: 1,
                        },
                    ],
                },
            )
            .unwrap_err();

        let DispatchError::Domain(DomainError::Validation(message)) = err else {
            panic!("expected a validation failure");
        };
        assert!(message.contains("line 1: requested 10 exceeds available stock 5"));
        assert!(message.contains("line 2: material"));

        // Nothing was filed.
        assert!(p.projections.requests.list(tenant_id).is_empty());
    }

    #[test]
    fn release_location_is_all_or_nothing() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        let receipt = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(20, 600), cement_line(30, 600)]),
                    false,
                )
                .unwrap(),
        );

        // Aisle without shelf/level is refused.
        let mut partial = good_release("2", "B", "1");
        partial.shelf = None;
        partial.level = None;
        let err = p
            .quality
            .decide(tenant_id, receipt.lines[0].quarantine_id, partial)
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::IncompleteLocation)
        ));

        // No location at all falls back to the general area tag.
        let none = QualityDecision {
            kind: DecisionKind::Good,
            aisle: None,
            shelf: None,
            level: None,
            remarks: None,
            certificate_ref: None,
        };
        let record = p
            .quality
            .decide(tenant_id, receipt.lines[0].quarantine_id, none)
            .unwrap();
        assert_eq!(record.location_label.as_deref(), Some("GENERAL STORAGE"));
    }

    #[test]
    fn filed_request_dispatches_issues_and_marks_the_request() {
        let p = pipeline();
        let tenant_id = test_tenant_id();
        let project_id = ProjectId::new(AggregateId::new());

        let receipt = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(100, 600)]),
                    false,
                )
                .unwrap(),
        );
        let material_id = receipt.lines[0].material.material_id();
        p.quality
            .decide(
                tenant_id,
                receipt.lines[0].quarantine_id,
                good_release("2", "B", "1"),
            )
            .unwrap();

        let budget = p
            .requests
            .register_budget_item(tenant_id, project_id, "E-411", "Slab pour, level 4", Some(100))
            .unwrap();

        let filed = p
            .requests
            .file_request(
                tenant_id,
                RequestSubmission {
                    project_id,
                    budget_item_id: Some(budget.budget_item_id),
                    requester: "J. Herrera".to_string(),
                    request_type: RequestType::Consumption,
                    lines: vec![RequestLineSubmission {
                        material_id,
                        quantity: 60,
                    }],
                },
            )
            .unwrap();
        assert_eq!(filed.view.status, RequestStatus::Requested);
        // 60 > 40% of 100: advisory only.
        assert_eq!(filed.warnings.len(), 1);
        assert!(filed.warnings[0].contains("exceeds 40%"));

        let dispatched = p
            .requests
            .dispatch_request(tenant_id, filed.view.request_id)
            .unwrap();
        assert_eq!(dispatched.status, RequestStatus::Dispatched);
        assert!(dispatched.dispatched_at.is_some());

        let material = p.projections.materials.get(tenant_id, &material_id).unwrap();
        assert_eq!(material.available_stock, 40);

        let kardex = p.projections.kardex.list_for_material(tenant_id, material_id);
        let issue = kardex
            .iter()
            .find(|row| row.kind == MovementKind::IssueConsumption)
            .unwrap();
        assert_eq!(issue.quantity_delta, -60);
        assert_eq!(
            issue.reference.as_deref(),
            Some(filed.view.request_id.to_string().as_str())
        );

        // Second dispatch is refused and issues nothing further.
        let err = p
            .requests
            .dispatch_request(tenant_id, filed.view.request_id)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
        let material = p.projections.materials.get(tenant_id, &material_id).unwrap();
        assert_eq!(material.available_stock, 40);
    }

    #[test]
    fn dispatch_aborts_before_issuing_when_stock_ran_out() {
        let p = pipeline();
        let tenant_id = test_tenant_id();
        let project_id = ProjectId::new(AggregateId::new());

        let receipt = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(50, 600)]),
                    false,
                )
                .unwrap(),
        );
        let material_id = receipt.lines[0].material.material_id();
        p.quality
            .decide(
                tenant_id,
                receipt.lines[0].quarantine_id,
                good_release("2", "B", "1"),
            )
            .unwrap();

        let filed = p
            .requests
            .file_request(
                tenant_id,
                RequestSubmission {
                    project_id,
                    budget_item_id: None,
                    requester: "J. Herrera".to_string(),
                    request_type: RequestType::Epp,
                    lines: vec![RequestLineSubmission {
                        material_id,
                        quantity: 50,
                    }],
                },
            )
            .unwrap();

        // Stock drains between filing and dispatch.
        p.stock
            .post_movement(
                tenant_id,
                MovementRequest {
                    material_id,
                    kind: MovementKind::IssueConsumption,
                    quantity: 30,
                    origin: None,
                    destination: None,
                    reference: Some("walk-up issue".to_string()),
                    unit_cost: None,
                },
            )
            .unwrap();

        let err = p
            .requests
            .dispatch_request(tenant_id, filed.view.request_id)
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::InsufficientStock {
                available: 20,
                requested: 50,
            })
        ));

        // Request stays open, stock stays at 20.
        let view = p
            .projections
            .requests
            .get(tenant_id, &filed.view.request_id)
            .unwrap();
        assert_eq!(view.status, RequestStatus::Requested);
        let material = p.projections.materials.get(tenant_id, &material_id).unwrap();
        assert_eq!(material.available_stock, 20);
    }

    #[test]
    fn transfer_moves_stock_between_locations_without_changing_the_balance() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        let receipt = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(40, 600)]),
                    false,
                )
                .unwrap(),
        );
        let material_id = receipt.lines[0].material.material_id();
        p.quality
            .decide(
                tenant_id,
                receipt.lines[0].quarantine_id,
                good_release("2", "B", "1"),
            )
            .unwrap();

        let view = p
            .stock
            .transfer(
                tenant_id,
                material_id,
                40,
                "AISLE 2 | SHELF B | LEVEL 1".to_string(),
                Some("AISLE 7 | SHELF A | LEVEL 2".to_string()),
                Some("reorganization".to_string()),
            )
            .unwrap();
        assert_eq!(view.available_stock, 40);

        let kardex = p.projections.kardex.list_for_material(tenant_id, material_id);
        let legs: Vec<_> = kardex
            .iter()
            .filter(|row| row.kind == MovementKind::Transfer)
            .collect();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].movement_id, legs[1].movement_id);
        assert_eq!(legs[0].quantity_delta + legs[1].quantity_delta, 0);
        assert!(legs.iter().all(|row| row.code == Some(311)));
    }

    #[test]
    fn tenant_isolation_spans_the_whole_pipeline() {
        let p = pipeline();
        let tenant_a = test_tenant_id();
        let tenant_b = test_tenant_id();

        registered(
            p.intake
                .submit_purchase(
                    tenant_a,
                    acme_submission("F-001", vec![cement_line(50, 600)]),
                    false,
                )
                .unwrap(),
        );

        assert!(p.projections.providers.list(tenant_b).is_empty());
        assert!(p.projections.materials.list(tenant_b).is_empty());
        assert!(p.projections.documents.list(tenant_b).is_empty());
        assert!(p.projections.quarantine.list(tenant_b).is_empty());

        // The same invoice number in another tenant is not a duplicate.
        let outcome = p
            .intake
            .submit_purchase(
                tenant_b,
                acme_submission("F-001", vec![cement_line(50, 600)]),
                false,
            )
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Registered(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn extracted_draft_flows_through_the_same_validation() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        let url = format!("mem://{}/f-001.jpg", tenant_id.as_uuid());
        p.extractor.script(
            url.clone(),
            ExtractedInvoice {
                provider_name: "ACME, C.A.".to_string(),
                provider_tax_id: "J-12345678-9".to_string(),
                invoice_number: "F-001".to_string(),
                issue_date: None,
                total_amount: Some(34_800),
                lines: vec![ExtractedLine {
                    name: "Cemento Gris Tipo I".to_string(),
                    quantity: 50,
                    unit_price: 600,
                }],
                purchase_order_ref: None,
                delivery_note_ref: None,
                vehicle_plate: None,
            },
        );

        let (stored_url, draft) = p
            .intake
            .extract_draft(tenant_id, "f-001.jpg", b"scan bytes".to_vec())
            .await
            .unwrap();
        assert_eq!(stored_url, url);
        assert!(p.scans.get(&stored_url).is_some());
        assert_eq!(draft.support_document_ref.as_deref(), Some(url.as_str()));

        // The extracted draft registers exactly like a manual one, carrying
        // the declared total instead of a recomputed one.
        let receipt = registered(p.intake.submit_purchase(tenant_id, draft, false).unwrap());
        assert_eq!(receipt.total_amount, 34_800);
        let document = p
            .projections
            .documents
            .get(tenant_id, &receipt.document_id)
            .unwrap();
        assert_eq!(document.support_document_ref.as_deref(), Some(url.as_str()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_extraction_writes_nothing() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        // No script for this url: the extractor reports unavailable.
        let err = p
            .intake
            .extract_draft(tenant_id, "unreadable.jpg", b"noise".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            acopio_extraction::ExtractionError::Unavailable
        ));

        assert!(p.projections.documents.list(tenant_id).is_empty());
        assert!(p.projections.providers.list(tenant_id).is_empty());
        // The scan itself is kept for a later manual attempt.
        assert_eq!(p.scans.len(), 1);
    }

    #[test]
    fn rebuilt_projections_match_the_live_ones() {
        let p = pipeline();
        let tenant_id = test_tenant_id();

        let receipt = registered(
            p.intake
                .submit_purchase(
                    tenant_id,
                    acme_submission("F-001", vec![cement_line(50, 600)]),
                    false,
                )
                .unwrap(),
        );
        let material_id = receipt.lines[0].material.material_id();
        p.quality
            .decide(
                tenant_id,
                receipt.lines[0].quarantine_id,
                good_release("2", "B", "1"),
            )
            .unwrap();

        // Fresh read models fed only by the event log.
        let rebuilt = ProjectionSet::in_memory(p.settings.movement_codes);
        let replayed = rebuilt.replay_all(p.store.as_ref()).unwrap();
        assert!(replayed > 0);

        assert_eq!(
            rebuilt.materials.get(tenant_id, &material_id),
            p.projections.materials.get(tenant_id, &material_id)
        );
        assert_eq!(
            rebuilt.documents.get(tenant_id, &receipt.document_id),
            p.projections.documents.get(tenant_id, &receipt.document_id)
        );
        assert_eq!(
            rebuilt.kardex.list_for_material(tenant_id, material_id),
            p.projections.kardex.list_for_material(tenant_id, material_id)
        );
        assert_eq!(
            rebuilt
                .quarantine
                .get(tenant_id, &receipt.lines[0].quarantine_id),
            p.projections
                .quarantine
                .get(tenant_id, &receipt.lines[0].quarantine_id)
        );
    }
}
