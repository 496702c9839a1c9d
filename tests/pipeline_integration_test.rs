//! 管线集成测试

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use adscope::agents::prompts::{
        CREATIVE_PROMPT, DATA_AGENT_PROMPT, EVALUATOR_PROMPT, INSIGHT_PROMPT, PLANNER_PROMPT,
    };
    use adscope::agents::{
        AgentCapability, AgentKind, AgentOutput, AgentRegistry, ContextExcerpt, CreativeGenerator,
        DataAgent, Evaluator, InsightAgent, PlannerAgent,
    };
    use adscope::core::{ExecutorConfig, PipelineError, RetryPolicy, StepState};
    use adscope::data::AdsTable;
    use adscope::llm::{LlmClient, MockLlmClient};
    use adscope::observability::Telemetry;
    use adscope::schema::{
        CreativeRecommendation, CreativeSuggestions, Evaluation, Evidence, Impact, Insight, Parsed,
        Plan, PlanStep,
    };
    use adscope::{AnalysisPipeline, PipelineParts, PipelineSettings};
    use async_trait::async_trait;

    /// 固定输出的能力
    struct Fixed {
        kind: AgentKind,
        output: AgentOutput,
    }

    #[async_trait]
    impl AgentCapability for Fixed {
        fn kind(&self) -> AgentKind {
            self.kind
        }

        async fn invoke(
            &self,
            _instruction: &str,
            _excerpt: &ContextExcerpt,
        ) -> Result<AgentOutput, PipelineError> {
            Ok(self.output.clone())
        }
    }

    /// 总是返回给定错误的能力
    struct Failing {
        kind: AgentKind,
        make: fn() -> PipelineError,
    }

    #[async_trait]
    impl AgentCapability for Failing {
        fn kind(&self) -> AgentKind {
            self.kind
        }

        async fn invoke(
            &self,
            _instruction: &str,
            _excerpt: &ContextExcerpt,
        ) -> Result<AgentOutput, PipelineError> {
            Err((self.make)())
        }
    }

    fn fixed(kind: AgentKind, output: AgentOutput) -> Arc<dyn AgentCapability> {
        Arc::new(Fixed { kind, output })
    }

    fn stub_plan() -> Plan {
        Plan::new(vec![
            PlanStep::new("Summarize", "DataAgent", "summarize"),
            PlanStep::new("Find cause", "InsightAgent", "find cause"),
            PlanStep::new("Propose fixes", "CreativeGenerator", "propose fixes"),
        ])
    }

    fn stub_insight() -> Insight {
        Insight {
            hypothesis: "STUB-HYPOTHESIS audience saturation".into(),
            evidence: vec![Evidence {
                metric: "ctr".into(),
                delta: "-25%".into(),
                segment: Some("Campaign A".into()),
            }],
            impact: Impact::High,
            confidence: 0.75,
            reasoning: "frequency up, CTR down".into(),
        }
    }

    fn settings(output_dir: &std::path::Path) -> PipelineSettings {
        PipelineSettings {
            policy: RetryPolicy::new(1, Duration::ZERO),
            executor: ExecutorConfig {
                step_delay: Duration::ZERO,
                ..ExecutorConfig::default()
            },
            output_dir: output_dir.to_path_buf(),
        }
    }

    fn stub_registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry.register(
            fixed(AgentKind::DataAgent, AgentOutput::DataTable("STUB-DATA-TABLE".into())),
            RetryPolicy::no_retry(),
        );
        registry.register(
            fixed(
                AgentKind::InsightAgent,
                AgentOutput::Insights(Parsed::Valid(vec![stub_insight()])),
            ),
            RetryPolicy::no_retry(),
        );
        registry.register(
            fixed(
                AgentKind::CreativeGenerator,
                AgentOutput::Creatives(Parsed::Valid(CreativeSuggestions {
                    recommendations: vec![CreativeRecommendation {
                        campaign_name: "STUB-CAMPAIGN".into(),
                        current_performance_issue: "CTR down".into(),
                        suggested_headline: "New headline".into(),
                        suggested_message: "New message".into(),
                        reasoning: "Fresh angle".into(),
                    }],
                })),
            ),
            RetryPolicy::no_retry(),
        );
        registry
    }

    #[tokio::test]
    async fn test_stub_pipeline_report_order() {
        let out = tempfile::tempdir().unwrap();
        let parts = PipelineParts {
            planner: fixed(AgentKind::Planner, AgentOutput::Plan(stub_plan())),
            registry: stub_registry(),
            reviewer: Some(fixed(
                AgentKind::Evaluator,
                AgentOutput::Review(Evaluation {
                    score: Some(8.0),
                    verdict: "Good".into(),
                    issues: vec![],
                    rigor_errors: vec![],
                }),
            )),
            llms: vec![],
        };
        let pipeline = AnalysisPipeline::new(parts, settings(out.path()), Telemetry::disabled());
        let summary = pipeline.run("Why did ROAS drop?").await.unwrap();

        assert_eq!(summary.trace.last(), Some(&StepState::Completed));
        assert!(!summary.is_degraded());
        assert!(summary.evaluation.passed());

        let report = std::fs::read_to_string(&summary.artifacts.report).unwrap();
        let data = report.find("STUB-DATA-TABLE").unwrap();
        let hypothesis = report.find("STUB-HYPOTHESIS").unwrap();
        let campaign = report.find("STUB-CAMPAIGN").unwrap();
        assert!(data < hypothesis && hypothesis < campaign);

        let insights: Vec<Insight> =
            serde_json::from_str(&std::fs::read_to_string(&summary.artifacts.insights).unwrap())
                .unwrap();
        assert_eq!(insights, vec![stub_insight()]);
        assert!(summary.artifacts.creatives.as_ref().unwrap().exists());
        assert!(summary.artifacts.evaluation.exists());
    }

    #[tokio::test]
    async fn test_failed_review_still_writes_report() {
        let out = tempfile::tempdir().unwrap();
        let parts = PipelineParts {
            planner: fixed(AgentKind::Planner, AgentOutput::Plan(stub_plan())),
            registry: stub_registry(),
            reviewer: Some(Arc::new(Failing {
                kind: AgentKind::Evaluator,
                make: || PipelineError::unclassified("evaluator offline"),
            })),
            llms: vec![],
        };
        let pipeline = AnalysisPipeline::new(parts, settings(out.path()), Telemetry::disabled());
        let summary = pipeline.run("q").await.unwrap();
        assert!(summary.evaluation.score.is_none());
        assert!(summary.evaluation.verdict.contains("evaluator offline"));
        assert!(summary.artifacts.report.exists());
    }

    #[tokio::test]
    async fn test_unknown_agent_aborts_without_artifacts() {
        let out = tempfile::tempdir().unwrap();
        let plan = Plan::new(vec![
            PlanStep::new("Summarize", "DataAgent", "summarize"),
            PlanStep::new("Predict", "ForecastAgent", "predict next week"),
        ]);
        let parts = PipelineParts {
            planner: fixed(AgentKind::Planner, AgentOutput::Plan(plan)),
            registry: stub_registry(),
            reviewer: None,
            llms: vec![],
        };
        let reports = out.path().join("reports");
        let pipeline = AnalysisPipeline::new(parts, settings(&reports), Telemetry::disabled());
        let err = pipeline.run("q").await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownAgent { .. }));
        assert!(!reports.exists());
    }

    #[tokio::test]
    async fn test_planner_failure_and_empty_plan_abort() {
        let out = tempfile::tempdir().unwrap();
        let failing = PipelineParts {
            planner: Arc::new(Failing {
                kind: AgentKind::Planner,
                make: || PipelineError::unclassified("503 Service Unavailable"),
            }),
            registry: stub_registry(),
            reviewer: None,
            llms: vec![],
        };
        let pipeline = AnalysisPipeline::new(failing, settings(out.path()), Telemetry::disabled());
        let err = pipeline.run("q").await.unwrap_err();
        assert_eq!(err.attempts(), Some(2));

        let empty = PipelineParts {
            planner: fixed(AgentKind::Planner, AgentOutput::Plan(Plan::new(vec![]))),
            registry: stub_registry(),
            reviewer: None,
            llms: vec![],
        };
        let pipeline = AnalysisPipeline::new(empty, settings(out.path()), Telemetry::disabled());
        let err = pipeline.run("q").await.unwrap_err();
        assert!(err.to_string().contains("empty plan"));
    }

    /// 真实智能体 + 脚本化 LLM：验证 prompt -> JSON -> 查询 -> 报告的完整链路
    #[tokio::test]
    async fn test_real_agents_with_scripted_llm() {
        let csv = "date,campaign_name,adset_name,impressions,clicks,spend,roas,ctr,creative_message\n\
            2025-02-01,Summer Sale,Broad,1000,30,50,3.5,0.03,Beat the heat\n\
            2025-02-02,Summer Sale,Broad,1200,18,60,1.5,0.015,Beat the heat\n\
            2025-02-01,Winter Promo,Lookalike,800,40,40,4.0,0.05,Stay warm\n";
        let table = Arc::new(AdsTable::from_reader(csv.as_bytes()).unwrap());

        let llm = Arc::new(MockLlmClient::with_replies([
            // Planner
            r#"{"steps": [
                {"step_name": "ROAS by campaign", "description": "ROAS by campaign", "agent": "DataAgent"},
                {"step_name": "Diagnose", "description": "Explain the ROAS drop", "agent": "InsightAgent"},
                {"step_name": "Refresh creatives", "description": "Propose new creatives", "agent": "CreativeGenerator"}
            ]}"#,
            // DataAgent 步骤
            r#"{"group_by": "campaign_name", "metrics": ["spend", "roas"], "sort_by": {"metric": "roas"}}"#,
            // InsightAgent
            r#"```json
            [{"hypothesis": "Summer Sale creative is fatiguing", "evidence": [{"metric": "ctr", "delta": "-50%", "segment": "Summer Sale"}],
              "impact": "High", "confidence": 0.7, "reasoning": "CTR halved day over day"}]
            ```"#,
            // 隐式 top ads 获取
            r#"{"metrics": ["roas"], "sort_by": {"metric": "roas"}, "limit": 5, "columns": ["creative_message"]}"#,
            // CreativeGenerator
            r#"{"recommendations": [{"campaign_name": "Summer Sale", "current_performance_issue": "CTR halved",
              "suggested_headline": "Stay cool, pay less", "suggested_message": "New drops every week",
              "reasoning": "Borrows the winning urgency of Winter Promo"}]}"#,
            // 最终评审
            r#"{"score": 7, "verdict": "Reasonable diagnosis", "issues": []}"#,
        ]));
        let shared: Arc<dyn LlmClient> = llm.clone();
        let telemetry = Telemetry::disabled();

        let mut registry = AgentRegistry::new();
        let policy = RetryPolicy::new(1, Duration::ZERO);
        registry.register(
            Arc::new(DataAgent::new(shared.clone(), table, DATA_AGENT_PROMPT, telemetry.clone())),
            policy.clone(),
        );
        registry.register(
            Arc::new(InsightAgent::new(shared.clone(), INSIGHT_PROMPT, telemetry.clone())),
            policy.clone(),
        );
        registry.register(
            Arc::new(CreativeGenerator::new(shared.clone(), CREATIVE_PROMPT, telemetry.clone())),
            policy.clone(),
        );
        let parts = PipelineParts {
            planner: Arc::new(PlannerAgent::new(shared.clone(), PLANNER_PROMPT, telemetry.clone())),
            registry,
            reviewer: Some(Arc::new(Evaluator::new(
                shared.clone(),
                EVALUATOR_PROMPT,
                telemetry.clone(),
            ))),
            llms: vec![shared],
        };

        let out = tempfile::tempdir().unwrap();
        let pipeline = AnalysisPipeline::new(parts, settings(out.path()), telemetry);
        let summary = pipeline.run("Why did ROAS drop for Summer Sale?").await.unwrap();

        assert_eq!(llm.calls(), 6);
        assert_eq!(summary.failed_steps(), 0);
        assert_eq!(summary.evaluation.score, Some(7.0));
        assert!(summary.evaluation.rigor_errors.is_empty());

        let report = std::fs::read_to_string(&summary.artifacts.report).unwrap();
        assert!(report.contains("| Winter Promo | 1 | 40.00 | 4.00 |"));
        assert!(report.contains("#### 1. Summer Sale creative is fatiguing"));
        assert!(report.contains("### Campaign: Summer Sale"));

        // 隐式 top ads 获取不计入步骤
        let succeeded = summary
            .trace
            .iter()
            .filter(|s| matches!(s, StepState::StepSucceeded(_)))
            .count();
        assert_eq!(succeeded, 3);
    }
}
